//! SQL template rendering
//!
//! Trigger DDL is produced from embedded templates carrying `%%KEY%%`
//! placeholders. Rendering is a pure function of the template name and a
//! key/value map. A placeholder whose key is absent or maps to an empty
//! value stays in the output untouched, so a malformed render is visible in
//! the generated statement rather than silently blanked.

use crate::error::{Result, TapError};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%%([^%\n]+)%%").expect("placeholder pattern is invalid - this is a bug")
});

/// Template defining a change-capture trigger.
pub const CREATE_TRIGGER: &str = "create_trigger.sql";

const TEMPLATES: &[(&str, &str)] = &[(
    CREATE_TRIGGER,
    include_str!("../templates/create_trigger.sql"),
)];

/// Render the named template, substituting every `%%KEY%%` placeholder
/// with its value from `values`.
pub fn render(template_name: &str, values: &HashMap<String, String>) -> Result<String> {
    let source = TEMPLATES
        .iter()
        .find(|(name, _)| *name == template_name)
        .map(|(_, body)| *body)
        .ok_or_else(|| TapError::TemplateNotFound(template_name.to_string()))?;

    let mut rendered = source.to_string();
    for capture in PLACEHOLDER.captures_iter(source) {
        let key = capture[1].trim();
        let placeholder = &capture[0];
        match values.get(key) {
            Some(value) if !value.is_empty() => {
                rendered = rendered.replace(placeholder, value);
            }
            _ => {}
        }
    }
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_unknown_template_is_an_error() {
        let err = render("no_such_template.sql", &HashMap::new()).unwrap_err();
        assert!(matches!(err, TapError::TemplateNotFound(_)));
    }

    #[test]
    fn test_trigger_template_substitution() {
        let rendered = render(
            CREATE_TRIGGER,
            &values(&[
                ("LIBRARY", "TABLETAP"),
                ("TRIGGER_NAME", "TT12345678"),
                ("SOURCE_SCHEMA", "SALES"),
                ("SOURCE_TABLE", "ORDERS"),
                ("DATA_QUEUE_NAME", "TT12345678"),
                ("COLUMN_DATA", "KEY 'ID' VALUE n.ID"),
                ("COLUMN_DATA_ON_DELETE", "KEY 'ID' VALUE o.ID"),
            ]),
        )
        .unwrap();

        assert!(rendered.contains("TABLETAP.TT12345678"));
        assert!(rendered.contains("SALES.ORDERS"));
        assert!(rendered.contains("VALUE n.ID"));
        assert!(rendered.contains("VALUE o.ID"));
        assert!(!rendered.contains("%%"), "unsubstituted placeholder left:\n{rendered}");
    }

    #[test]
    fn test_empty_value_leaves_placeholder() {
        let rendered = render(CREATE_TRIGGER, &values(&[("LIBRARY", "")])).unwrap();
        assert!(rendered.contains("%%LIBRARY%%"));
    }
}
