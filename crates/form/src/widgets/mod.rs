//! Concrete widgets.
//!
//! Leaf widgets wrap a single value cell; composites own nested widgets and
//! publish an aggregate of their parts.

pub mod attachments;
pub mod checkbox;
pub mod combobox;
pub mod datetime;
pub mod dropdown;
pub mod file_input;
pub mod files;
pub mod list;
pub mod owners;
pub mod person;
pub mod relationships;
pub mod scientific_metadata;
pub mod string_list;
pub mod techniques;
pub mod text;

pub use attachments::{Attachment, AttachmentsInput};
pub use checkbox::CheckboxInput;
pub use combobox::{ComboboxInput, ComboboxMode, ComboboxOptions};
pub use datetime::DatetimeInput;
pub use dropdown::DropdownInput;
pub use file_input::{FileDetails, FileInput};
pub use files::{FilesInput, FilesSummary, FilesValue};
pub use list::{GrowableList, ListItem, RemovalPolicy};
pub use owners::OwnersInput;
pub use person::PersonInput;
pub use relationships::RelationshipsInput;
pub use scientific_metadata::{ScientificMetadata, ScientificMetadataInput};
pub use string_list::StringListInput;
pub use techniques::TechniquesInput;
pub use text::{TextInput, TextOptions};
