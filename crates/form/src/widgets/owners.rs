use cean_types::{Person, WidgetKey};
use serde_json::{Value, json};

use crate::FormError;
use crate::cell::{Field, ValueCell};
use crate::widget::{EventOutcome, FormContext, InputWidget, UiAction, decode};
use crate::widgets::list::{GrowableList, ListItem, RemovalPolicy};
use crate::widgets::person::PersonInput;

impl ListItem for PersonInput {
    fn has_value(&self) -> bool {
        self.value().is_some()
    }
}

/// Growable list of persons. The sole remaining row cannot be removed.
pub struct OwnersInput {
    field: Field<Vec<Person>>,
    list: GrowableList<PersonInput>,
}

impl OwnersInput {
    pub fn new(ctx: &FormContext, key: WidgetKey, required: bool) -> Self {
        let items = ctx.child_scope();
        let list = GrowableList::new(key.clone(), RemovalPolicy::KeepSole, move |item_key| {
            PersonInput::new(&items, item_key, false)
        });
        Self {
            field: Field::new(&ctx.bus, ctx.scope, ValueCell::new(key).required(required)),
            list,
        }
    }

    pub fn list(&self) -> &GrowableList<PersonInput> {
        &self.list
    }

    pub fn owners(&self) -> Vec<Person> {
        self.list.filled().filter_map(PersonInput::value).collect()
    }

    fn collect(&self) {
        let owners = self.owners();
        let error = self.list.validation_error();
        self.field.with_mut(|cell| {
            cell.set_value((!owners.is_empty()).then_some(owners));
            cell.set_external_error(error);
        });
    }
}

impl InputWidget for OwnersInput {
    fn key(&self) -> &WidgetKey {
        self.field.key()
    }

    fn value_json(&self) -> Value {
        self.field.value_json()
    }

    fn set_value_json(&mut self, value: Value) -> Result<(), FormError> {
        let owners: Option<Vec<Value>> = decode(self.key(), value)?;
        self.list.set_values(owners.unwrap_or_default())?;
        self.collect();
        Ok(())
    }

    fn validation_error(&self) -> Option<String> {
        self.list.validation_error().or_else(|| self.field.check())
    }

    fn handle(&mut self, target: &WidgetKey, action: UiAction) -> EventOutcome {
        if !target.is_within(self.key()) {
            return EventOutcome::Ignored;
        }
        let outcome = self.list.handle(target, action);
        if !outcome.is_ignored() {
            self.collect();
        }
        if outcome.is_committed() {
            self.field.confirm();
        }
        outcome
    }

    fn apply_backend_error(&mut self, field: &WidgetKey, message: &str) -> bool {
        if field == self.key() {
            self.field.report_error(Some(message.to_string()));
            return true;
        }
        self.list.apply_backend_error(field, message)
    }

    fn refresh(&mut self) {
        self.list.refresh();
        self.collect();
    }

    fn dispose(&mut self) {
        self.list.dispose();
        self.field.dispose();
    }

    fn snapshot(&self) -> Value {
        let items: Vec<Value> = self
            .list
            .items()
            .iter()
            .enumerate()
            .map(|(index, item)| {
                json!({
                    "key": item.key(),
                    "removable": self.list.can_remove(index),
                    "person": item.snapshot(),
                })
            })
            .collect();
        json!({
            "value": self.value_json(),
            "items": items,
            "error": self.validation_error(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::context;

    #[test]
    fn typing_an_owner_grows_the_list_and_publishes_all_owners() {
        let (ctx, _) = context();
        let mut owners = OwnersInput::new(&ctx, "owners".into(), true);
        let key = owners.key().clone();
        assert_eq!(owners.validation_error().as_deref(), Some("Required"));

        let name = WidgetKey::from("owners.0.name");
        owners.handle(&name, UiAction::Input("Ada".into()));
        assert!(owners.handle(&name, UiAction::Blur).is_committed());
        assert_eq!(owners.list().len(), 2);
        assert_eq!(owners.value_json(), json!([{"name": "Ada", "email": ""}]));
        assert!(owners.is_valid());

        assert!(owners.handle(&key.child(0), UiAction::Remove).is_committed());
        assert_eq!(owners.list().len(), 1);
        assert_eq!(owners.value_json(), Value::Null);
    }
}
