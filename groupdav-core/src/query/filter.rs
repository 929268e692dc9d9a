//! CALDAV:filter element tree (RFC 4791 §9.7).

use serde::{Deserialize, Serialize};

use crate::date_range::DateRange;
use crate::event::ComponentKind;

/// Matching rule for text values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Collation {
    /// `i;ascii-casemap`: ASCII letters compare case-insensitively
    #[default]
    #[serde(rename = "i;ascii-casemap")]
    AsciiCasemap,
    /// `i;octet`: exact bytes
    #[serde(rename = "i;octet")]
    Octet,
}

/// Substring match, optionally negated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMatch {
    pub value: String,
    #[serde(default)]
    pub negate_condition: bool,
    #[serde(default)]
    pub collation: Collation,
}

impl TextMatch {
    pub fn new(value: &str) -> Self {
        TextMatch {
            value: value.to_string(),
            negate_condition: false,
            collation: Collation::default(),
        }
    }

    pub fn negated(mut self) -> Self {
        self.negate_condition = true;
        self
    }

    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = collation;
        self
    }

    pub fn matches(&self, text: &str) -> bool {
        let found = match self.collation {
            Collation::Octet => text.contains(&self.value),
            Collation::AsciiCasemap => text
                .to_ascii_lowercase()
                .contains(&self.value.to_ascii_lowercase()),
        };
        found != self.negate_condition
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamFilter {
    pub name: String,
    #[serde(default)]
    pub is_not_defined: bool,
    #[serde(default)]
    pub text_match: Option<TextMatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropFilter {
    pub name: String,
    #[serde(default)]
    pub is_not_defined: bool,
    #[serde(default)]
    pub time_range: Option<DateRange>,
    #[serde(default)]
    pub text_match: Option<TextMatch>,
    #[serde(default)]
    pub param_filters: Vec<ParamFilter>,
}

impl PropFilter {
    pub fn new(name: &str) -> Self {
        PropFilter {
            name: name.to_ascii_uppercase(),
            is_not_defined: false,
            time_range: None,
            text_match: None,
            param_filters: Vec::new(),
        }
    }

    pub fn not_defined(name: &str) -> Self {
        PropFilter {
            is_not_defined: true,
            ..PropFilter::new(name)
        }
    }

    pub fn text(name: &str, text_match: TextMatch) -> Self {
        PropFilter {
            text_match: Some(text_match),
            ..PropFilter::new(name)
        }
    }

    pub fn with_param(mut self, param: ParamFilter) -> Self {
        self.param_filters.push(param);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompFilter {
    pub name: String,
    #[serde(default)]
    pub is_not_defined: bool,
    #[serde(default)]
    pub time_range: Option<DateRange>,
    #[serde(default)]
    pub prop_filters: Vec<PropFilter>,
    #[serde(default)]
    pub comp_filters: Vec<CompFilter>,
}

impl CompFilter {
    pub fn new(name: &str) -> Self {
        CompFilter {
            name: name.to_ascii_uppercase(),
            is_not_defined: false,
            time_range: None,
            prop_filters: Vec::new(),
            comp_filters: Vec::new(),
        }
    }

    /// `VCALENDAR > <kind>` restricted to `range`, the shape of most
    /// calendar-query reports.
    pub fn time_range(kind: ComponentKind, range: DateRange) -> Self {
        CompFilter::new("VCALENDAR").with_comp(CompFilter {
            time_range: Some(range),
            ..CompFilter::new(kind.as_ics_name())
        })
    }

    pub fn with_comp(mut self, filter: CompFilter) -> Self {
        self.comp_filters.push(filter);
        self
    }

    pub fn with_prop(mut self, filter: PropFilter) -> Self {
        self.prop_filters.push(filter);
        self
    }

    /// The window of the first VEVENT/VTODO time-range under the root, used
    /// to pre-select candidates by their stored bounds.
    pub fn candidate_range(&self) -> Option<DateRange> {
        self.comp_filters
            .iter()
            .filter(|f| !f.is_not_defined && ComponentKind::from_ics_name(&f.name).is_some())
            .find_map(|f| f.time_range)
    }
}
