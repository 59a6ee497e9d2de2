use std::cell::RefCell;
use std::rc::Rc;

use cean_comm::BackendComm;
use cean_types::WidgetKey;
use cean_types::wire::{ReqLoadImage, ResLoadImage};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::FormError;
use crate::cell::{Field, ValueCell};
use crate::widget::{EventOutcome, FormContext, InputWidget, UiAction, decode};
use crate::widgets::list::{GrowableList, ListItem, RemovalPolicy};
use crate::widgets::text::{TextInput, TextOptions};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub path: String,
    #[serde(default)]
    pub caption: String,
}

/// One image attachment: a path, a caption and the thumbnail the backend
/// loaded for the path.
pub struct AttachmentItem {
    key: WidgetKey,
    path: TextInput,
    caption: TextInput,
    image: Rc<RefCell<Option<String>>>,
    comm: BackendComm,
}

impl AttachmentItem {
    pub fn new(ctx: &FormContext, key: WidgetKey) -> Self {
        let path = TextInput::new(ctx, key.child("path"), TextOptions::default());
        let caption = TextInput::new(ctx, key.child("caption"), TextOptions::default());
        let image = Rc::new(RefCell::new(None));

        let path_field = path.field().downgrade();
        let caption_field = caption.field().downgrade();
        let thumbnail = Rc::downgrade(&image);
        ctx.comm.on_res_load_image(&key, move |response: ResLoadImage| {
            let (Some(path), Some(caption), Some(thumbnail)) =
                (path_field.upgrade(), caption_field.upgrade(), thumbnail.upgrade())
            else {
                return;
            };
            if let Some(error) = response.error {
                *thumbnail.borrow_mut() = None;
                path.report_error(Some(error));
                return;
            }
            *thumbnail.borrow_mut() = response.image;
            path.report_error(None);
            if let Some(text) = response.caption.filter(|text| !text.is_empty()) {
                caption.set_value(Some(text));
            }
        });

        Self {
            key,
            path,
            caption,
            image,
            comm: ctx.comm.clone(),
        }
    }

    pub fn attachment(&self) -> Option<Attachment> {
        Some(Attachment {
            path: self.path.value()?,
            caption: self.caption.text(),
        })
    }

    pub fn image(&self) -> Option<String> {
        self.image.borrow().clone()
    }

    fn load_image(&self) {
        let Some(path) = self.path.value() else {
            *self.image.borrow_mut() = None;
            return;
        };
        debug!(key = %self.key, path = %path, "loading attachment image");
        if let Err(err) = self.comm.send_req_load_image(&self.key, &ReqLoadImage { path }) {
            warn!(key = %self.key, error = %err, "failed to send image request");
        }
    }
}

impl InputWidget for AttachmentItem {
    fn key(&self) -> &WidgetKey {
        &self.key
    }

    fn value_json(&self) -> Value {
        self.attachment().map_or(Value::Null, |attachment| json!(attachment))
    }

    fn set_value_json(&mut self, value: Value) -> Result<(), FormError> {
        let attachment: Option<Attachment> = decode(&self.key, value)?;
        let attachment = attachment.unwrap_or_default();
        self.path.set_text(attachment.path);
        self.caption.set_text(attachment.caption);
        *self.image.borrow_mut() = None;
        Ok(())
    }

    fn validation_error(&self) -> Option<String> {
        self.path
            .validation_error()
            .or_else(|| self.caption.validation_error())
    }

    fn handle(&mut self, target: &WidgetKey, action: UiAction) -> EventOutcome {
        let outcome = self.path.handle(target, action.clone());
        if outcome.is_committed() {
            self.load_image();
        }
        if !outcome.is_ignored() {
            return outcome;
        }
        self.caption.handle(target, action)
    }

    fn apply_backend_error(&mut self, field: &WidgetKey, message: &str) -> bool {
        if field == &self.key {
            let path_key = self.path.key().clone();
            return self.path.apply_backend_error(&path_key, message);
        }
        self.path.apply_backend_error(field, message) || self.caption.apply_backend_error(field, message)
    }

    fn dispose(&mut self) {
        self.comm.off_res_load_image(&self.key);
        self.path.dispose();
        self.caption.dispose();
    }

    fn snapshot(&self) -> Value {
        json!({
            "key": self.key,
            "path": self.path.snapshot(),
            "caption": self.caption.snapshot(),
            "image": self.image(),
        })
    }
}

impl ListItem for AttachmentItem {
    fn has_value(&self) -> bool {
        self.path.value().is_some()
    }

    fn is_blank(&self) -> bool {
        self.path.is_blank() && self.caption.is_blank()
    }
}

/// Growable list of image attachments; any row can be removed.
pub struct AttachmentsInput {
    field: Field<Vec<Attachment>>,
    list: GrowableList<AttachmentItem>,
}

impl AttachmentsInput {
    pub fn new(ctx: &FormContext, key: WidgetKey) -> Self {
        let items = ctx.child_scope();
        let list = GrowableList::new(key.clone(), RemovalPolicy::Free, move |item_key| {
            AttachmentItem::new(&items, item_key)
        });
        Self {
            field: Field::new(&ctx.bus, ctx.scope, ValueCell::new(key)),
            list,
        }
    }

    pub fn list(&self) -> &GrowableList<AttachmentItem> {
        &self.list
    }

    fn collect(&self) {
        let attachments: Vec<Attachment> = self.list.filled().filter_map(AttachmentItem::attachment).collect();
        let error = self.list.validation_error();
        self.field.with_mut(|cell| {
            cell.set_value((!attachments.is_empty()).then_some(attachments));
            cell.set_external_error(error);
        });
    }
}

impl InputWidget for AttachmentsInput {
    fn key(&self) -> &WidgetKey {
        self.field.key()
    }

    fn value_json(&self) -> Value {
        self.field.value_json()
    }

    fn set_value_json(&mut self, value: Value) -> Result<(), FormError> {
        let attachments: Option<Vec<Value>> = decode(self.key(), value)?;
        self.list.set_values(attachments.unwrap_or_default())?;
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
    use cean_types::Envelope;

    #[test]
    fn confirming_a_path_loads_the_image_and_caption() {
        let (ctx, transport) = context();
        let mut attachments = AttachmentsInput::new(&ctx, "attachments".into());
        let path = WidgetKey::from("attachments.0.path");

        attachments.handle(&path, UiAction::Input("/img/sample.png".into()));
        assert!(attachments.handle(&path, UiAction::Enter).is_committed());
        let sent = transport.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].key.as_str(), "attachments.0");
        assert_eq!(sent[0].payload, json!({"path": "/img/sample.png"}));

        ctx.comm.dispatch(Envelope::new(
            "res:load-image",
            "attachments.0".into(),
            json!({"image": "data:image/png;base64,AAAA", "caption": "Sample"}),
        ));
        attachments.refresh();
        let item = &attachments.list().items()[0];
        assert_eq!(item.image().as_deref(), Some("data:image/png;base64,AAAA"));
        assert_eq!(
            attachments.value_json(),
            json!([{"path": "/img/sample.png", "caption": "Sample"}])
        );
    }

    #[test]
    fn image_error_lands_on_the_path() {
        let (ctx, _) = context();
        let mut attachments = AttachmentsInput::new(&ctx, "attachments".into());
        let path = WidgetKey::from("attachments.0.path");
        attachments.handle(&path, UiAction::Input("/nope".into()));
        attachments.handle(&path, UiAction::Blur);
        ctx.comm.dispatch(Envelope::new(
            "res:load-image",
            "attachments.0".into(),
            json!({"error": "not an image"}),
        ));
        assert_eq!(attachments.validation_error().as_deref(), Some("not an image"));
    }

    #[test]
    fn removed_item_stops_receiving_images() {
        let (ctx, _) = context();
        let mut attachments = AttachmentsInput::new(&ctx, "attachments".into());
        let path = WidgetKey::from("attachments.0.path");
        attachments.handle(&path, UiAction::Input("/img/a.png".into()));
        attachments.handle(&path, UiAction::Enter);

        assert!(attachments.handle(&"attachments.0".into(), UiAction::Remove).is_committed());
        assert_eq!(attachments.list().len(), 1);
        let outcome = ctx.comm.dispatch(Envelope::new(
            "res:load-image",
            "attachments.0".into(),
            json!({"image": "data:"}),
        ));
        assert!(!outcome.is_delivered());
    }
}
