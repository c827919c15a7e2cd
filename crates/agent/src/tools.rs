use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use skydesk_core::TravelerContext;
use thiserror::Error;

pub const FAQ_LOOKUP_TOOL: &str = "faq_lookup";
pub const UPDATE_SEAT_TOOL: &str = "update_seat";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("invalid arguments for `{tool}`: {reason}")]
    InvalidArguments { tool: &'static str, reason: String },
    #[error("flight number is required before a seat can be updated")]
    MissingFlightNumber,
}

/// A callable exposed to the language model for structured invocation.
///
/// `parameters` is the JSON schema advertised to the model; `execute`
/// receives the decoded argument object and the mutable session context.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn parameters(&self) -> Value;
    async fn execute(
        &self,
        context: &mut TravelerContext,
        input: Value,
    ) -> Result<String, ToolError>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<&'static str, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name(), Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(Box::as_ref)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.tools.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a registered tool by name against the session context.
    pub async fn dispatch(
        &self,
        name: &str,
        context: &mut TravelerContext,
        input: Value,
    ) -> Result<String, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.execute(context, input).await
    }

    /// The two airline domain tools.
    pub fn airline_default() -> Self {
        let mut registry = Self::default();
        registry.register(FaqLookupTool);
        registry.register(UpdateSeatTool);
        registry
    }
}

const BAGGAGE_KEYWORDS: &[&str] =
    &["bag", "baggage", "luggage", "carry-on", "hand luggage", "hand carry"];
const SEATING_KEYWORDS: &[&str] = &["seat", "seats", "seating", "plane"];
const WIFI_KEYWORDS: &[&str] =
    &["wifi", "internet", "wireless", "connectivity", "network", "online"];

const BAGGAGE_ANSWER: &str = "You are allowed to bring one bag on the plane. \
     It must be under 50 pounds and 22 inches x 14 inches x 9 inches.";
const SEATING_ANSWER: &str = "There are 120 seats on the plane. \
     There are 22 business class seats and 98 economy seats. \
     Exit rows are rows 4 and 16. \
     Rows 5-8 are Economy Plus, with extra legroom.";
const WIFI_ANSWER: &str = "We have free wifi on the plane, join Airline-Wifi";
const FALLBACK_ANSWER: &str = "I'm sorry, I don't know the answer to that question.";

/// Keyword lookup over a fixed FAQ set. No ranking, no fuzzy matching, no
/// persistence.
#[derive(Debug, Default)]
pub struct FaqLookupTool;

#[derive(Debug, Deserialize)]
struct FaqLookupArgs {
    question: String,
}

#[async_trait]
impl Tool for FaqLookupTool {
    fn name(&self) -> &'static str {
        FAQ_LOOKUP_TOOL
    }

    fn description(&self) -> &'static str {
        "Lookup frequently asked questions about the airline."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The customer's question."
                }
            },
            "required": ["question"]
        })
    }

    async fn execute(
        &self,
        _context: &mut TravelerContext,
        input: Value,
    ) -> Result<String, ToolError> {
        let args: FaqLookupArgs = parse_args(self.name(), input)?;
        Ok(lookup_answer(&args.question).to_string())
    }
}

fn lookup_answer(question: &str) -> &'static str {
    let question = question.to_lowercase();
    let matches_any =
        |keywords: &[&str]| keywords.iter().any(|keyword| question.contains(keyword));

    if matches_any(BAGGAGE_KEYWORDS) {
        BAGGAGE_ANSWER
    } else if matches_any(SEATING_KEYWORDS) {
        SEATING_ANSWER
    } else if matches_any(WIFI_KEYWORDS) {
        WIFI_ANSWER
    } else {
        FALLBACK_ANSWER
    }
}

/// Writes the confirmation number and new seat into the session context.
/// Requires a flight number, normally established by the seeded context or
/// an earlier handoff.
#[derive(Debug, Default)]
pub struct UpdateSeatTool;

#[derive(Debug, Deserialize)]
struct UpdateSeatArgs {
    confirmation_number: String,
    new_seat: String,
}

#[async_trait]
impl Tool for UpdateSeatTool {
    fn name(&self) -> &'static str {
        UPDATE_SEAT_TOOL
    }

    fn description(&self) -> &'static str {
        "Update the seat for a given confirmation number."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "confirmation_number": {
                    "type": "string",
                    "description": "The confirmation number for the flight."
                },
                "new_seat": {
                    "type": "string",
                    "description": "The new seat to update to."
                }
            },
            "required": ["confirmation_number", "new_seat"]
        })
    }

    async fn execute(
        &self,
        context: &mut TravelerContext,
        input: Value,
    ) -> Result<String, ToolError> {
        let args: UpdateSeatArgs = parse_args(self.name(), input)?;

        // Checked before any write so a failed call leaves the record as it
        // was.
        if context.flight_number.is_none() {
            return Err(ToolError::MissingFlightNumber);
        }

        context.confirmation_number = Some(args.confirmation_number.clone());
        context.seat_number = Some(args.new_seat.clone());

        Ok(format!(
            "Updated seat to {} for confirmation number {}",
            args.new_seat, args.confirmation_number
        ))
    }
}

fn parse_args<T>(tool: &'static str, input: Value) -> Result<T, ToolError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(input)
        .map_err(|error| ToolError::InvalidArguments { tool, reason: error.to_string() })
}
