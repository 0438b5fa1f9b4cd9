//! Request and result types for name generation

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const MIN_NAMES: usize = 1;
pub const MAX_NAMES: usize = 10;

/// Longest free-text input forwarded to the model, in characters.
pub const MAX_INPUT_CHARS: usize = 100;

/// A validated name generation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest
{   animal: String
  , traits: Vec<String>
  , theme: Option<String>
  , num_names: usize
}

impl GenerationRequest
{   /// Sanitise and validate caller input.
    ///
    /// Fails with [`Error::InvalidInput`] when `animal` is blank or
    /// `num_names` falls outside `MIN_NAMES..=MAX_NAMES`.
    pub fn new<S: AsRef<str>>(
      animal: &str
    , traits: &[S]
    , theme: Option<&str>
    , num_names: usize
    ) -> Result<Self>
    {   let animal = sanitize_input(animal);
        if animal.is_empty()
        {   return Err(Error::InvalidInput(
              "animal type is required".to_string()
            ));
        }

        if !(MIN_NAMES..=MAX_NAMES).contains(&num_names)
        {   return Err(Error::InvalidInput(format!(
              "number of names must be between {} and {}, got {}",
              MIN_NAMES, MAX_NAMES, num_names
            )));
        }

        let traits = traits
          .iter()
          .map(|t| sanitize_input(t.as_ref()))
          .filter(|t| !t.is_empty())
          .collect();

        let theme = theme
          .map(sanitize_input)
          .filter(|t| !t.is_empty());

        Ok(GenerationRequest
        {   animal
          , traits
          , theme
          , num_names
        })
    }

    pub fn animal(&self) -> &str { &self.animal }
    pub fn traits(&self) -> &[String] { &self.traits }
    pub fn theme(&self) -> Option<&str> { self.theme.as_deref() }
    pub fn num_names(&self) -> usize { self.num_names }
}

/// One suggested name and why it fits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameSuggestion
{   pub name: String
  , pub reason: String
}

/// Trim, collapse whitespace runs and cap the length of free text.
pub fn sanitize_input(text: &str) -> String
{   text.split_whitespace()
      .collect::<Vec<_>>()
      .join(" ")
      .chars()
      .take(MAX_INPUT_CHARS)
      .collect::<String>()
      .trim_end()
      .to_string()
}
