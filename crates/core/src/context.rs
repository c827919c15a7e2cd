use serde::{Deserialize, Serialize};

/// Shared state for one conversation session.
///
/// Tools mutate this record as the conversation progresses; agents see a
/// rendered summary of it in their system prompt. All fields start unset
/// unless the session is seeded.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelerContext {
    pub passenger_name: Option<String>,
    pub confirmation_number: Option<String>,
    pub seat_number: Option<String>,
    pub flight_number: Option<String>,
}

impl TravelerContext {
    /// Seeded record used by the demo chat loop: a known passenger already
    /// checked in on a flight, so the seat-booking routine works end to end.
    pub fn demo() -> Self {
        Self {
            passenger_name: Some("John Doe".to_string()),
            confirmation_number: None,
            seat_number: Some("A12".to_string()),
            flight_number: Some("FLT-123".to_string()),
        }
    }

    /// One-line rendering for system prompts and log fields. Unset fields
    /// render as `-`.
    pub fn summary(&self) -> String {
        fn field(value: &Option<String>) -> &str {
            value.as_deref().unwrap_or("-")
        }

        format!(
            "passenger={} confirmation={} seat={} flight={}",
            field(&self.passenger_name),
            field(&self.confirmation_number),
            field(&self.seat_number),
            field(&self.flight_number),
        )
    }
}
