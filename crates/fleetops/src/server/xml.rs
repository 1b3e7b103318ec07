use serde::{Deserialize, Serialize};

pub const INPUT_TYPE_SCRIPT: &str = "script";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionAttribute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub data_type: String,
    pub input_type: InputType,
    #[serde(default)]
    pub inventory_display: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputType {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub script: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancedSearch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    #[serde(default)]
    pub view_as: String,
    #[serde(default)]
    pub criteria: Criteria,
    #[serde(default)]
    pub display_fields: DisplayFields,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criteria {
    #[serde(default)]
    pub size: usize,
    #[serde(default)]
    pub criterion: Vec<Criterion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub name: String,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub and_or: String,
    pub search_type: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub opening_paren: bool,
    #[serde(default)]
    pub closing_paren: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayFields {
    #[serde(default)]
    pub size: usize,
    #[serde(default)]
    pub display_field: Vec<DisplayField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayField {
    pub name: String,
}

impl Criteria {
    pub fn new(criterion: Vec<Criterion>) -> Self {
        Self {
            size: criterion.len(),
            criterion,
        }
    }
}

impl DisplayFields {
    pub fn new(names: &[&str]) -> Self {
        Self {
            size: names.len(),
            display_field: names
                .iter()
                .map(|n| DisplayField {
                    name: (*n).to_string(),
                })
                .collect(),
        }
    }
}

/// Response body of a classic-API POST/PUT.
#[derive(Debug, Clone, Deserialize)]
pub struct IdOnly {
    pub id: u64,
}

pub fn to_xml<T: Serialize>(root: &str, value: &T) -> Result<String, String> {
    quick_xml::se::to_string_with_root(root, value).map_err(|e| e.to_string())
}

/// Text content comes back with surrounding whitespace trimmed, so a script
/// read from the server never ends in the newline it was sent with.
pub fn from_xml<T: for<'de> Deserialize<'de>>(raw: &str) -> Result<T, String> {
    quick_xml::de::from_str(raw).map_err(|e| e.to_string())
}
