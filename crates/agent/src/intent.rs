use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    SetLineCount,
    AddPlan,
    AddDevice,
    AddProtection,
    SelectSim,
    Checkout,
    CheckStatus,
    Unknown,
}

/// Output of the intent classifier. Entity keys are free-form strings the
/// router knows how to read (`line_count`, `requested_line`, `sim_type`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifiedIntent {
    pub intent: Intent,
    pub entities: BTreeMap<String, String>,
}

/// Black-box classifier contract. Production deployments plug in an
/// external model; the keyword classifier below is the deterministic
/// built-in used offline.
pub trait IntentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> ClassifiedIntent;
}

#[derive(Clone, Debug, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl IntentClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> ClassifiedIntent {
        let normalized_text = text.to_ascii_lowercase();
        let tokens = tokenize(&normalized_text);
        let mut entities = BTreeMap::new();

        if let Some(line) = extract_number_after(&tokens, &["line"]) {
            entities.insert("requested_line".to_string(), line.to_string());
        }
        if let Some(sim) = extract_sim_mention(&normalized_text) {
            entities.insert("sim_type".to_string(), sim.to_string());
        }

        let intent = if contains_any(&normalized_text, &["status", "where is my order", "track"]) {
            Intent::CheckStatus
        } else if contains_any(&normalized_text, &["checkout", "check out", "buy now", "purchase"])
        {
            Intent::Checkout
        } else if contains_any(&normalized_text, &["protection", "insurance", "warranty"]) {
            Intent::AddProtection
        } else if contains_any(&normalized_text, &["device", "phone", "handset"]) {
            Intent::AddDevice
        } else if contains_any(&normalized_text, &["esim", "e-sim", "physical sim", "sim"]) {
            Intent::SelectSim
        } else if contains_any(&normalized_text, &["plan", "unlimited", "data"]) {
            Intent::AddPlan
        } else if let Some(count) = extract_number_before(&tokens, &["line", "lines"]) {
            entities.insert("line_count".to_string(), count.to_string());
            Intent::SetLineCount
        } else if contains_any(&normalized_text, &["line", "lines"]) {
            Intent::SetLineCount
        } else {
            Intent::Unknown
        };

        // "2 lines with plans" should still carry the count entity.
        if intent == Intent::SetLineCount || contains_any(&normalized_text, &["line", "lines"]) {
            if let Some(count) = extract_number_before(&tokens, &["line", "lines"]) {
                entities.insert("line_count".to_string(), count.to_string());
            }
        }

        ClassifiedIntent { intent, entities }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_ascii_alphanumeric() {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().map(|token| token.to_string()).collect()
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| text.contains(needle))
}

fn extract_number_before(tokens: &[String], units: &[&str]) -> Option<usize> {
    for window in tokens.windows(2) {
        if let [value, unit] = window {
            if units.contains(&unit.as_str()) {
                if let Ok(number) = value.parse::<usize>() {
                    return Some(number);
                }
            }
        }
    }
    None
}

fn extract_number_after(tokens: &[String], markers: &[&str]) -> Option<usize> {
    for window in tokens.windows(2) {
        if let [marker, value] = window {
            if markers.contains(&marker.as_str()) {
                if let Ok(number) = value.parse::<usize>() {
                    return Some(number);
                }
            }
        }
    }
    None
}

fn extract_sim_mention(text: &str) -> Option<&'static str> {
    if text.contains("esim") || text.contains("e-sim") {
        Some("ESIM")
    } else if text.contains("physical") || text.contains("sim card") {
        Some("PHYSICAL")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{ClassifiedIntent, Intent, IntentClassifier, KeywordClassifier};

    fn classify(text: &str) -> ClassifiedIntent {
        KeywordClassifier::new().classify(text)
    }

    #[test]
    fn line_count_phrases_carry_the_count_entity() {
        let classified = classify("I need 3 lines for my family");
        assert_eq!(classified.intent, Intent::SetLineCount);
        assert_eq!(classified.entities.get("line_count").map(String::as_str), Some("3"));
    }

    #[test]
    fn plan_requests_with_a_target_line_extract_both() {
        let classified = classify("put the unlimited plan on line 2");
        assert_eq!(classified.intent, Intent::AddPlan);
        assert_eq!(classified.entities.get("requested_line").map(String::as_str), Some("2"));
    }

    #[test]
    fn checkout_and_status_are_distinguished() {
        assert_eq!(classify("let's checkout").intent, Intent::Checkout);
        assert_eq!(classify("what's the status of my order").intent, Intent::CheckStatus);
    }

    #[test]
    fn protection_outranks_the_device_keyword() {
        let classified = classify("add phone protection");
        assert_eq!(classified.intent, Intent::AddProtection);
    }

    #[test]
    fn sim_mentions_carry_the_sim_type_entity() {
        let classified = classify("switch line 1 to a physical sim");
        assert_eq!(classified.intent, Intent::SelectSim);
        assert_eq!(classified.entities.get("sim_type").map(String::as_str), Some("PHYSICAL"));
    }

    #[test]
    fn unrelated_text_is_unknown() {
        assert_eq!(classify("tell me a joke").intent, Intent::Unknown);
    }
}
