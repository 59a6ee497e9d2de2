use cean_types::WidgetKey;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{Value, json};

use crate::cell::{Field, ValueCell};
use crate::widget::{EventOutcome, FormContext, InputWidget, UiAction, decode};
use crate::{FormError, TextBuffer};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMATS: [&str; 2] = ["%H:%M:%S", "%H:%M"];

pub const INVALID_DATE: &str = "Invalid date";
pub const INVALID_TIME: &str = "Invalid time";

/// Date and time typed into separate parts, published as one timestamp.
///
/// The parts are addressed as `{key}.date` and `{key}.time`.
pub struct DatetimeInput {
    field: Field<NaiveDateTime>,
    date_key: WidgetKey,
    time_key: WidgetKey,
    date: TextBuffer,
    time: TextBuffer,
}

impl DatetimeInput {
    pub fn new(ctx: &FormContext, key: WidgetKey, required: bool) -> Self {
        let date_key = key.child("date");
        let time_key = key.child("time");
        Self {
            field: Field::new(&ctx.bus, ctx.scope, ValueCell::new(key).required(required)),
            date_key,
            time_key,
            date: TextBuffer::new(),
            time: TextBuffer::new(),
        }
    }

    pub fn value(&self) -> Option<NaiveDateTime> {
        self.field.value()
    }

    /// Re-reads both parts into the cell. Unparsable text leaves the value
    /// empty and records why.
    fn parse(&self) {
        let parsed = parse_parts(self.date.text(), self.time.text());
        self.field.with_mut(|cell| match parsed {
            Ok(value) => {
                cell.set_value(value);
                cell.set_external_error(None);
            }
            Err(message) => {
                cell.set_value(None);
                cell.set_external_error(Some(message.to_string()));
            }
        });
    }

    fn part_mut(&mut self, target: &WidgetKey) -> Option<&mut TextBuffer> {
        if target == &self.date_key {
            Some(&mut self.date)
        } else if target == &self.time_key {
            Some(&mut self.time)
        } else {
            None
        }
    }
}

fn parse_parts(date: &str, time: &str) -> Result<Option<NaiveDateTime>, &'static str> {
    let date = date.trim();
    if date.is_empty() {
        return Ok(None);
    }
    let date = NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|_| INVALID_DATE)?;
    let time = time.trim();
    let time = if time.is_empty() {
        NaiveTime::MIN
    } else {
        TIME_FORMATS
            .iter()
            .find_map(|format| NaiveTime::parse_from_str(time, format).ok())
            .ok_or(INVALID_TIME)?
    };
    Ok(Some(date.and_time(time)))
}

impl InputWidget for DatetimeInput {
    fn key(&self) -> &WidgetKey {
        self.field.key()
    }

    fn value_json(&self) -> Value {
        self.field.value_json()
    }

    fn set_value_json(&mut self, value: Value) -> Result<(), FormError> {
        let value: Option<NaiveDateTime> = decode(self.key(), value)?;
        match value {
            Some(value) => {
                self.date.set_text(value.format(DATE_FORMAT).to_string());
                self.time.set_text(value.format("%H:%M:%S").to_string());
            }
            None => {
                self.date.clear();
                self.time.clear();
            }
        }
        self.field.with_mut(|cell| {
            cell.set_value(value);
            cell.set_external_error(None);
        });
        Ok(())
    }

    fn validation_error(&self) -> Option<String> {
        self.field.check()
    }

    fn handle(&mut self, target: &WidgetKey, action: UiAction) -> EventOutcome {
        if !target.is_within(self.key()) {
            return EventOutcome::Ignored;
        }
        let Some(part) = self.part_mut(target) else {
            return EventOutcome::Ignored;
        };
        match action {
            UiAction::Input(text) => part.set_text(text),
            UiAction::Char(c) => part.insert_char(c),
            UiAction::Backspace => part.backspace(),
            UiAction::Left => part.move_left(),
            UiAction::Right => part.move_right(),
            UiAction::Enter | UiAction::Blur => {
                self.parse();
                self.field.confirm();
                return EventOutcome::Committed;
            }
            UiAction::Focus | UiAction::Click => return EventOutcome::Handled,
            _ => return EventOutcome::Ignored,
        }
        self.parse();
        EventOutcome::Handled
    }

    fn apply_backend_error(&mut self, field: &WidgetKey, message: &str) -> bool {
        if !field.is_within(self.key()) {
            return false;
        }
        self.field.report_error(Some(message.to_string()));
        true
    }

    fn dispose(&mut self) {
        self.field.dispose();
    }

    fn snapshot(&self) -> Value {
        let cell = self.field.borrow();
        json!({
            "date": self.date.text(),
            "time": self.time.text(),
            "value": cell.value_json(),
            "status": cell.status(),
        })
    }
}
