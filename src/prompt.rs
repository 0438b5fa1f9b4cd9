//! Prompt construction for name generation

use serde::{Deserialize, Serialize};

use crate::request::GenerationRequest;

pub const SYSTEM_PROMPT: &str
  = "You generate creative, relevant pet names. Always respond with valid JSON only.";

/// System and user messages for one generation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt
{   pub system: String
  , pub user: String
}

/// Build the model instruction for a request. Pure and deterministic.
pub fn build_prompt(request: &GenerationRequest) -> Prompt
{   let traits = if request.traits().is_empty()
    {   "no specific traits".to_string()
    } else
    {   request.traits().join(", ")
    };
    let theme = request.theme().unwrap_or("any theme");
    let count = request.num_names();
    let noun = if count == 1 { "name" } else { "names" };

    let user = format!(
"You are a knowledgeable pet-naming assistant. Suggest exactly {count} unique {noun} for a {animal} given these traits: {traits}. Theme: {theme}.

Return ONLY a valid JSON array containing exactly {count} objects with this exact format:
[{{\"name\": \"Example Name\", \"reason\": \"Brief explanation of why this name fits the pet\"}}]

Do not include any text before or after the JSON array. Make sure each name is creative and relevant, and that the reason explains the connection to the animal, traits, or theme. Keep reasons under 100 characters.",
      count = count,
      noun = noun,
      animal = request.animal(),
      traits = traits,
      theme = theme,
    );

    Prompt
    {   system: SYSTEM_PROMPT.to_string()
      , user
    }
}
