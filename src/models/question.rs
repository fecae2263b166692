use serde::{Deserialize, Serialize};

/// A single-answer multiple-choice question as supplied by question ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i32,
    pub text: String,
    pub options: Vec<String>,
    pub correct_option_index: i32,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl Question {
    pub fn has_option(&self, option_index: i32) -> bool {
        option_index >= 0 && (option_index as usize) < self.options.len()
    }

    pub fn to_public(&self) -> PublicQuestion {
        PublicQuestion {
            id: self.id,
            text: self.text.clone(),
            options: self.options.clone(),
        }
    }
}

/// Question as shown to an entrant: the answer key is never sent out.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PublicQuestion {
    pub id: i32,
    pub text: String,
    pub options: Vec<String>,
}
