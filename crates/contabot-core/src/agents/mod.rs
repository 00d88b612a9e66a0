//! Agent nodes and the manager that routes between them
//!
//! - [`welcome`]: classifies intent, first node of a fresh conversation
//! - [`company_opening`]: company-opening specialist with sticky routing
//! - [`manager`]: builds the graph and collapses failures into safe replies

pub mod company_opening;
pub mod manager;
pub mod welcome;

pub use company_opening::{CompanyOpeningAgent, SpecialistResponder};
pub use manager::{AgentManager, ManagerConfig};
pub use welcome::{IntentClassifier, WelcomeAgent};

/// First `max_chars` characters of `s`, for log lines
pub(crate) fn preview(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_is_char_safe() {
        assert_eq!(preview("ação", 2), "aç");
        assert_eq!(preview("oi", 10), "oi");
    }
}
