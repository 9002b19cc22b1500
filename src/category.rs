use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of the column the pipeline appends.
pub const CATEGORY_COLUMN: &str = "Category";

/// Label used when a row could not be classified.
pub const FALLBACK_LABEL: &str = "Other";

/// Closed set of spending categories offered to the classifier.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Grocery,
    Transportation,
    #[serde(rename = "Dine-in")]
    DineIn,
    Social,
    Education,
    Personal,
    Car,
    Misc,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Grocery,
        Category::Transportation,
        Category::DineIn,
        Category::Social,
        Category::Education,
        Category::Personal,
        Category::Car,
        Category::Misc,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Grocery => "Grocery",
            Category::Transportation => "Transportation",
            Category::DineIn => "Dine-in",
            Category::Social => "Social",
            Category::Education => "Education",
            Category::Personal => "Personal",
            Category::Car => "Car",
            Category::Misc => "Misc",
        }
    }

    /// Case-insensitive lookup; a trailing period is tolerated.
    pub fn from_label(text: &str) -> Option<Self> {
        let text = text.trim().trim_end_matches('.');
        Category::ALL
            .into_iter()
            .find(|category| category.label().eq_ignore_ascii_case(text))
    }

    pub fn labels() -> Vec<&'static str> {
        Category::ALL.iter().map(Category::label).collect()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The instruction sent to the text-generation service for one description.
pub fn prompt_for(description: &str) -> String {
    format!(
        "get category of \"{}\" in one word. Available categories are: Grocery, Transportation, Dine-in, Social, Education, Personal, Car and Misc.",
        description
    )
}

/// What to do with an answer that is not one of the eight labels.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CategoryPolicy {
    /// Keep whatever the model said, trimmed.
    #[default]
    Trust,
    /// Map unknown answers to the fallback label.
    Enforce,
}

impl CategoryPolicy {
    pub fn resolve(&self, answer: &str) -> String {
        let answer = answer.trim();
        match self {
            CategoryPolicy::Trust => answer.to_string(),
            CategoryPolicy::Enforce => Category::from_label(answer)
                .map(|category| category.label().to_string())
                .unwrap_or_else(|| FALLBACK_LABEL.to_string()),
        }
    }
}

impl FromStr for CategoryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trust" => Ok(CategoryPolicy::Trust),
            "enforce" => Ok(CategoryPolicy::Enforce),
            other => Err(format!("Unknown category policy: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_every_category() {
        assert_eq!(
            prompt_for("bus fare"),
            "get category of \"bus fare\" in one word. Available categories are: Grocery, Transportation, Dine-in, Social, Education, Personal, Car and Misc."
        );
        for label in Category::labels() {
            assert!(prompt_for("").contains(label));
        }
    }

    #[test]
    fn looks_up_labels_loosely() {
        assert_eq!(Category::from_label("dine-in"), Some(Category::DineIn));
        assert_eq!(Category::from_label(" Grocery.\n"), Some(Category::Grocery));
        assert_eq!(Category::from_label("Groceries"), None);
    }

    #[test]
    fn trust_keeps_answer_verbatim() {
        assert_eq!(CategoryPolicy::Trust.resolve("  Coffee\n"), "Coffee");
    }

    #[test]
    fn enforce_falls_back_on_unknown_answers() {
        assert_eq!(CategoryPolicy::Enforce.resolve("transportation."), "Transportation");
        assert_eq!(CategoryPolicy::Enforce.resolve("Coffee"), FALLBACK_LABEL);
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("ENFORCE".parse::<CategoryPolicy>(), Ok(CategoryPolicy::Enforce));
        assert!("strict".parse::<CategoryPolicy>().is_err());
    }
}
