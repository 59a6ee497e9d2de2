use cean_types::{Person, WidgetKey};
use cean_util::{validate_email, validate_orcid};
use serde_json::{Value, json};

use crate::FormError;
use crate::cell::{Field, ValueCell};
use crate::widget::{EventOutcome, FormContext, InputWidget, UiAction, decode};
use crate::widgets::text::{TextInput, TextOptions};

/// Name, e-mail and optional ORCID, published together as one [`Person`].
///
/// Parts are keyed `{key}.name`, `{key}.email` and `{key}.orcid`. The person
/// is empty while every part is empty.
pub struct PersonInput {
    field: Field<Person>,
    name: TextInput,
    email: TextInput,
    orcid: TextInput,
}

impl PersonInput {
    pub fn new(ctx: &FormContext, key: WidgetKey, required: bool) -> Self {
        let parts = ctx.child_scope();
        let name = TextInput::new(&parts, key.child("name"), TextOptions::default());
        let email = TextInput::new(
            &parts,
            key.child("email"),
            TextOptions::default().validator(|email: &String| validate_email(email)),
        );
        let orcid = TextInput::new(
            &parts,
            key.child("orcid"),
            TextOptions::default().validator(|orcid: &String| validate_orcid(orcid)),
        );
        Self {
            field: Field::new(&ctx.bus, ctx.scope, ValueCell::new(key).required(required)),
            name,
            email,
            orcid,
        }
    }

    pub fn field(&self) -> &Field<Person> {
        &self.field
    }

    pub fn value(&self) -> Option<Person> {
        self.field.value()
    }

    pub fn is_blank(&self) -> bool {
        self.parts().iter().all(|part| part.is_blank())
    }

    fn parts(&self) -> [&TextInput; 3] {
        [&self.name, &self.email, &self.orcid]
    }

    fn parts_mut(&mut self) -> [&mut TextInput; 3] {
        [&mut self.name, &mut self.email, &mut self.orcid]
    }

    fn part_error(&self) -> Option<String> {
        self.parts().iter().find_map(|part| part.validation_error())
    }

    /// Rebuilds the aggregate from the parts.
    fn collect(&self) {
        let person = (!self.is_blank()).then(|| Person {
            name: self.name.text().trim().to_string(),
            email: self.email.text().trim().to_string(),
            orcid: self
                .orcid
                .value()
                .map(|orcid| orcid.trim().to_string())
                .filter(|orcid| !orcid.is_empty()),
        });
        let error = self.part_error();
        self.field.with_mut(|cell| {
            cell.set_value(person);
            cell.set_external_error(error);
        });
    }
}

impl InputWidget for PersonInput {
    fn key(&self) -> &WidgetKey {
        self.field.key()
    }

    fn value_json(&self) -> Value {
        self.field.value_json()
    }

    fn set_value_json(&mut self, value: Value) -> Result<(), FormError> {
        let person: Option<Person> = decode(self.key(), value)?;
        let person = person.unwrap_or_default();
        self.name.set_text(person.name);
        self.email.set_text(person.email);
        self.orcid.set_text(person.orcid.unwrap_or_default());
        self.collect();
        Ok(())
    }

    fn validation_error(&self) -> Option<String> {
        self.part_error().or_else(|| self.field.check())
    }

    fn handle(&mut self, target: &WidgetKey, action: UiAction) -> EventOutcome {
        if !target.is_within(self.key()) {
            return EventOutcome::Ignored;
        }
        let outcome = self
            .parts_mut()
            .into_iter()
            .map(|part| part.handle(target, action.clone()))
            .find(|outcome| !outcome.is_ignored())
            .unwrap_or(EventOutcome::Ignored);
        match outcome {
            EventOutcome::Committed => {
                self.collect();
                self.field.confirm();
                EventOutcome::Committed
            }
            EventOutcome::Handled => {
                self.collect();
                EventOutcome::Handled
            }
            EventOutcome::Ignored => EventOutcome::Ignored,
        }
    }

    fn apply_backend_error(&mut self, field: &WidgetKey, message: &str) -> bool {
        if field == self.key() {
            self.field.report_error(Some(message.to_string()));
            return true;
        }
        self.parts_mut()
            .into_iter()
            .any(|part| part.apply_backend_error(field, message))
    }

    fn dispose(&mut self) {
        for part in self.parts_mut() {
            part.dispose();
        }
        self.field.dispose();
    }

    fn snapshot(&self) -> Value {
        json!({
            "value": self.value_json(),
            "name": self.name.snapshot(),
            "email": self.email.snapshot(),
            "orcid": self.orcid.snapshot(),
            "error": self.validation_error(),
        })
    }
}
