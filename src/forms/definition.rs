//! Form definitions: an ordered list of typed fields.

use std::collections::HashSet;

use crate::error::ConfigError;

/// One choice of an options field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOption {
    /// Value stored when the option is selected.
    pub key: String,
    /// Button label.
    pub label: String,
}

impl FieldOption {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }
}

/// How a field's answer is collected and checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Options(Vec<FieldOption>),
    Percentage,
    Currency,
}

/// One step of a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Key under which the answer is stored. Unique within a form.
    pub key: String,
    /// Name shown in the confirmation summary.
    pub display_name: String,
    /// Prompt, already in MarkdownV2.
    pub prompt: String,
    pub kind: FieldKind,
    pub keyboard_columns: usize,
}

impl FieldSpec {
    pub fn text(key: impl Into<String>, display_name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            prompt: prompt.into(),
            kind: FieldKind::Text,
            keyboard_columns: 1,
        }
    }

    pub fn percentage(
        key: impl Into<String>,
        display_name: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            kind: FieldKind::Percentage,
            ..Self::text(key, display_name, prompt)
        }
    }

    pub fn currency(
        key: impl Into<String>,
        display_name: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            kind: FieldKind::Currency,
            ..Self::text(key, display_name, prompt)
        }
    }

    pub fn options(
        key: impl Into<String>,
        display_name: impl Into<String>,
        prompt: impl Into<String>,
        options: Vec<FieldOption>,
    ) -> Self {
        Self {
            kind: FieldKind::Options(options),
            ..Self::text(key, display_name, prompt)
        }
    }

    pub fn with_columns(mut self, columns: usize) -> Self {
        self.keyboard_columns = columns.max(1);
        self
    }

    /// Label of the option with `key`, for options fields.
    pub fn option_label(&self, key: &str) -> Option<&str> {
        match &self.kind {
            FieldKind::Options(options) => options
                .iter()
                .find(|o| o.key == key)
                .map(|o| o.label.as_str()),
            _ => None,
        }
    }
}

/// A named, validated sequence of fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormDefinition {
    name: String,
    fields: Vec<FieldSpec>,
}

impl FormDefinition {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Result<Self, ConfigError> {
        let name = name.into();
        let invalid = |reason: String| ConfigError::InvalidForm {
            form: name.clone(),
            reason,
        };

        if fields.is_empty() {
            return Err(invalid("a form needs at least one field".into()));
        }

        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.key.as_str()) {
                return Err(invalid(format!("duplicate field key {}", field.key)));
            }
            if let FieldKind::Options(options) = &field.kind
                && options.is_empty()
            {
                return Err(invalid(format!("options field {} has no options", field.key)));
            }
        }

        Ok(Self { name, fields })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&FieldSpec> {
        self.fields.get(index)
    }

    pub fn field_by_key(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
