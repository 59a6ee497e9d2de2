use cean_types::{Choice, Relationship, WidgetKey};
use serde_json::{Value, json};

use crate::FormError;
use crate::cell::{Field, ValueCell};
use crate::widget::{EventOutcome, FormContext, InputWidget, UiAction, decode};
use crate::widgets::combobox::{ComboboxInput, ComboboxOptions};
use crate::widgets::list::{GrowableList, ListItem, RemovalPolicy};
use crate::widgets::text::{TextInput, TextOptions};

fn relationship_choices() -> Vec<Choice> {
    vec![Choice::new("input", "input")]
}

/// A relationship kind and the dataset it points at.
pub struct RelationshipItem {
    key: WidgetKey,
    relationship: ComboboxInput,
    dataset: TextInput,
}

impl RelationshipItem {
    pub fn new(ctx: &FormContext, key: WidgetKey) -> Self {
        let relationship = ComboboxInput::new(
            ctx,
            key.child("relationship"),
            ComboboxOptions::new(relationship_choices()).allow_arbitrary(),
        );
        let dataset = TextInput::new(ctx, key.child("dataset"), TextOptions::default());
        Self {
            key,
            relationship,
            dataset,
        }
    }

    /// Present only when both parts are filled in.
    pub fn relationship(&self) -> Option<Relationship> {
        let relationship = self.relationship.value()?.trim().to_string();
        let dataset = self.dataset.value()?.trim().to_string();
        (!relationship.is_empty() && !dataset.is_empty()).then_some(Relationship { relationship, dataset })
    }
}

impl InputWidget for RelationshipItem {
    fn key(&self) -> &WidgetKey {
        &self.key
    }

    fn value_json(&self) -> Value {
        self.relationship().map_or(Value::Null, |relationship| json!(relationship))
    }

    fn set_value_json(&mut self, value: Value) -> Result<(), FormError> {
        let relationship: Option<Relationship> = decode(&self.key, value)?;
        let (kind, dataset) = relationship.map_or((Value::Null, Value::Null), |relationship| {
            (Value::String(relationship.relationship), Value::String(relationship.dataset))
        });
        self.relationship.set_value_json(kind)?;
        self.dataset.set_value_json(dataset)
    }

    fn validation_error(&self) -> Option<String> {
        self.relationship
            .validation_error()
            .or_else(|| self.dataset.validation_error())
    }

    fn handle(&mut self, target: &WidgetKey, action: UiAction) -> EventOutcome {
        match self.relationship.handle(target, action.clone()) {
            EventOutcome::Ignored => self.dataset.handle(target, action),
            outcome => outcome,
        }
    }

    fn apply_backend_error(&mut self, field: &WidgetKey, message: &str) -> bool {
        self.relationship.apply_backend_error(field, message) || self.dataset.apply_backend_error(field, message)
    }

    fn dispose(&mut self) {
        self.relationship.dispose();
        self.dataset.dispose();
    }

    fn snapshot(&self) -> Value {
        json!({
            "key": self.key,
            "relationship": self.relationship.snapshot(),
            "dataset": self.dataset.snapshot(),
        })
    }
}

impl ListItem for RelationshipItem {
    fn has_value(&self) -> bool {
        self.relationship().is_some()
    }

    fn is_blank(&self) -> bool {
        self.relationship.value().is_none() && self.dataset.value().is_none()
    }
}

/// Growable list of relationships to other datasets; any row can be removed.
pub struct RelationshipsInput {
    field: Field<Vec<Relationship>>,
    list: GrowableList<RelationshipItem>,
}

impl RelationshipsInput {
    pub fn new(ctx: &FormContext, key: WidgetKey) -> Self {
        let items = ctx.child_scope();
        let list = GrowableList::new(key.clone(), RemovalPolicy::Free, move |item_key| {
            RelationshipItem::new(&items, item_key)
        });
        Self {
            field: Field::new(&ctx.bus, ctx.scope, ValueCell::new(key)),
            list,
        }
    }

    pub fn list(&self) -> &GrowableList<RelationshipItem> {
        &self.list
    }

    fn collect(&self) {
        let relationships: Vec<Relationship> = self
            .list
            .filled()
            .filter_map(RelationshipItem::relationship)
            .collect();
        let error = self.list.validation_error();
        self.field.with_mut(|cell| {
            cell.set_value((!relationships.is_empty()).then_some(relationships));
            cell.set_external_error(error);
        });
    }
}

impl InputWidget for RelationshipsInput {
    fn key(&self) -> &WidgetKey {
        self.field.key()
    }

    fn value_json(&self) -> Value {
        self.field.value_json()
    }

    fn set_value_json(&mut self, value: Value) -> Result<(), FormError> {
        let relationships: Option<Vec<Value>> = decode(self.key(), value)?;
        self.list.set_values(relationships.unwrap_or_default())?;
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
        let items: Vec<Value> = self.list.items().iter().map(InputWidget::snapshot).collect();
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

    fn fill(relationships: &mut RelationshipsInput, index: usize, kind: &str, dataset: &str) {
        let item = WidgetKey::from("relationships").child(index);
        let kind_key = item.child("relationship");
        relationships.handle(&kind_key, UiAction::Input(kind.into()));
        relationships.handle(&kind_key, UiAction::Enter);
        let dataset_key = item.child("dataset");
        relationships.handle(&dataset_key, UiAction::Input(dataset.into()));
        relationships.handle(&dataset_key, UiAction::Blur);
    }

    #[test]
    fn item_counts_only_when_both_parts_are_filled() {
        let (ctx, _) = context();
        let mut relationships = RelationshipsInput::new(&ctx, "relationships".into());
        let kind_key = WidgetKey::from("relationships.0.relationship");
        relationships.handle(&kind_key, UiAction::Input("input".into()));
        relationships.handle(&kind_key, UiAction::Enter);
        assert_eq!(relationships.list().len(), 1);
        assert_eq!(relationships.value_json(), Value::Null);

        fill(&mut relationships, 0, "input", "20.500.12269/abc");
        assert_eq!(relationships.list().len(), 2);
        assert_eq!(
            relationships.value_json(),
            json!([{"relationship": "input", "dataset": "20.500.12269/abc"}])
        );
    }

    #[test]
    fn arbitrary_kinds_are_allowed_and_any_row_can_go() {
        let (ctx, _) = context();
        let mut relationships = RelationshipsInput::new(&ctx, "relationships".into());
        fill(&mut relationships, 0, "is derived from", "pid-1");
        fill(&mut relationships, 1, "input", "pid-2");
        assert_eq!(relationships.list().len(), 3);

        assert!(
            relationships
                .handle(&"relationships.0".into(), UiAction::Remove)
                .is_committed()
        );
        assert_eq!(
            relationships.value_json(),
            json!([{"relationship": "input", "dataset": "pid-2"}])
        );
        assert!(relationships.handle(&"relationships.3".into(), UiAction::Remove).is_ignored());
        assert!(relationships.handle(&"relationships.2".into(), UiAction::Remove).is_committed());
        assert_eq!(relationships.list().len(), 2);
    }
}
