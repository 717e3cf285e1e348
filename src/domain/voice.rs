//! Spoken phrase to canonical command mapping.
//!
//! Resolution is precision-first: an exact phrase wins over a contained
//! phrase, which wins over the `light <n>` pattern, which wins over the
//! "all lights" fallback.

use regex::Regex;
use std::collections::HashMap;
use std::fmt;

/// Highest switch number reachable by voice.
pub const MAX_VOICE_SWITCH: u32 = 8;

const NUMBER_WORDS: [&str; MAX_VOICE_SWITCH as usize] = [
    "one", "two", "three", "four", "five", "six", "seven", "eight",
];

const ON_WORDS: &[&str] = &["on", "open", "start", "enable"];
const OFF_WORDS: &[&str] = &["off", "close", "stop", "disable"];
const TOGGLE_WORDS: &[&str] = &["toggle", "switch"];
const ALL_LIGHTS_MARKERS: &[&str] = &["all light", "every light", "all the light"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchAction {
    On,
    Off,
    Toggle,
}

/// The normalized command a phrase resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalCommand {
    Light { number: u32, action: SwitchAction },
    AllLights { on: bool },
    Status,
    Help,
    Test,
    Unknown,
}

impl fmt::Display for CanonicalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Light { number, action } => {
                let action = match action {
                    SwitchAction::On => "ON",
                    SwitchAction::Off => "OFF",
                    SwitchAction::Toggle => "TOGGLE",
                };
                write!(f, "LIGHT{}_{}", number, action)
            }
            Self::AllLights { on: true } => f.write_str("ALL_LIGHTS_ON"),
            Self::AllLights { on: false } => f.write_str("ALL_LIGHTS_OFF"),
            Self::Status => f.write_str("STATUS"),
            Self::Help => f.write_str("HELP"),
            Self::Test => f.write_str("TEST"),
            Self::Unknown => f.write_str("UNKNOWN_COMMAND"),
        }
    }
}

pub struct VoiceCommandMapper {
    exact: HashMap<String, CanonicalCommand>,
    /// Phrases longest first, scanned for containment
    by_length: Vec<(String, CanonicalCommand)>,
    light_pattern: Regex,
}

impl Default for VoiceCommandMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceCommandMapper {
    pub fn new() -> Self {
        let phrases = build_phrases();

        let mut exact = HashMap::with_capacity(phrases.len());
        for (phrase, command) in &phrases {
            exact.entry(phrase.clone()).or_insert(*command);
        }

        // Stable sort keeps declaration order among equal lengths.
        let mut by_length = phrases;
        by_length.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        let light_pattern = Regex::new(
            r"\b(?:light|lamp|switch|device)\s*(\d+|one|two|three|four|five|six|seven|eight)\b",
        )
        .expect("light pattern is a valid regex");

        Self {
            exact,
            by_length,
            light_pattern,
        }
    }

    pub fn parse(&self, spoken: &str) -> CanonicalCommand {
        let text = normalize(spoken);
        if text.is_empty() {
            return CanonicalCommand::Unknown;
        }

        if let Some(command) = self.exact.get(&text) {
            return *command;
        }

        let padded = format!(" {} ", text);
        if let Some((_, command)) = self
            .by_length
            .iter()
            .find(|(phrase, _)| padded.contains(&format!(" {} ", phrase)))
        {
            return *command;
        }

        let words: Vec<&str> = text.split(' ').collect();

        if let Some(command) = self.match_light_pattern(&text, &words) {
            return command;
        }

        if ALL_LIGHTS_MARKERS.iter().any(|m| text.contains(m)) {
            if words.iter().any(|w| *w == "on" || *w == "enable") {
                return CanonicalCommand::AllLights { on: true };
            }
            if words.iter().any(|w| *w == "off" || *w == "disable") {
                return CanonicalCommand::AllLights { on: false };
            }
        }

        CanonicalCommand::Unknown
    }

    fn match_light_pattern(&self, text: &str, words: &[&str]) -> Option<CanonicalCommand> {
        let captures = self.light_pattern.captures(text)?;
        let number = word_to_number(captures.get(1)?.as_str())?;
        if !(1..=MAX_VOICE_SWITCH).contains(&number) {
            return None;
        }

        let has_any = |set: &[&str]| words.iter().any(|w| set.contains(w));
        let action = if has_any(ON_WORDS) {
            SwitchAction::On
        } else if has_any(OFF_WORDS) {
            SwitchAction::Off
        } else if has_any(TOGGLE_WORDS) {
            SwitchAction::Toggle
        } else {
            return None;
        };

        Some(CanonicalCommand::Light { number, action })
    }

    /// Every dictionary phrase with its command, sorted by phrase.
    pub fn available_commands(&self) -> Vec<(String, CanonicalCommand)> {
        let mut commands: Vec<_> = self
            .exact
            .iter()
            .map(|(phrase, command)| (phrase.clone(), *command))
            .collect();
        commands.sort_by(|a, b| a.0.cmp(&b.0));
        commands
    }
}

/// Lowercase, drop punctuation, collapse whitespace.
fn normalize(spoken: &str) -> String {
    let cleaned: String = spoken
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_punctuation() { ' ' } else { c })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn word_to_number(word: &str) -> Option<u32> {
    if let Some(pos) = NUMBER_WORDS.iter().position(|w| *w == word) {
        return Some(pos as u32 + 1);
    }
    word.parse().ok()
}

fn build_phrases() -> Vec<(String, CanonicalCommand)> {
    let mut phrases = Vec::new();

    for number in 1..=MAX_VOICE_SWITCH {
        let digit = number.to_string();
        let word = NUMBER_WORDS[(number - 1) as usize];
        let on = CanonicalCommand::Light {
            number,
            action: SwitchAction::On,
        };
        let off = CanonicalCommand::Light {
            number,
            action: SwitchAction::Off,
        };
        let toggle = CanonicalCommand::Light {
            number,
            action: SwitchAction::Toggle,
        };

        for n in [word, digit.as_str()] {
            phrases.push((format!("turn on light {}", n), on));
            phrases.push((format!("switch on light {}", n), on));
            phrases.push((format!("light {} on", n), on));
            phrases.push((format!("on light {}", n), on));
            phrases.push((format!("enable light {}", n), on));
            phrases.push((format!("power on light {}", n), on));

            phrases.push((format!("turn off light {}", n), off));
            phrases.push((format!("switch off light {}", n), off));
            phrases.push((format!("light {} off", n), off));
            phrases.push((format!("off light {}", n), off));
            phrases.push((format!("disable light {}", n), off));
            phrases.push((format!("power off light {}", n), off));

            phrases.push((format!("toggle light {}", n), toggle));
            phrases.push((format!("switch light {}", n), toggle));
        }
    }

    let all_on = CanonicalCommand::AllLights { on: true };
    let all_off = CanonicalCommand::AllLights { on: false };
    for phrase in [
        "turn on all lights",
        "all lights on",
        "lights on",
        "turn on every light",
        "switch on all lights",
    ] {
        phrases.push((phrase.to_string(), all_on));
    }
    for phrase in [
        "turn off all lights",
        "all lights off",
        "lights off",
        "turn off every light",
        "switch off all lights",
    ] {
        phrases.push((phrase.to_string(), all_off));
    }

    for phrase in [
        "what is the status",
        "get status",
        "check status",
        "show status",
        "current status",
        "status report",
    ] {
        phrases.push((phrase.to_string(), CanonicalCommand::Status));
    }

    for phrase in [
        "help",
        "show help",
        "what can i say",
        "available commands",
        "list commands",
    ] {
        phrases.push((phrase.to_string(), CanonicalCommand::Help));
    }

    for phrase in ["test", "test connection", "check connection"] {
        phrases.push((phrase.to_string(), CanonicalCommand::Test));
    }

    phrases
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &str) -> String {
        VoiceCommandMapper::new().parse(text).to_string()
    }

    #[test]
    fn test_exact_phrases() {
        assert_eq!(token("turn on light two"), "LIGHT2_ON");
        assert_eq!(token("light 3 off"), "LIGHT3_OFF");
        assert_eq!(token("all lights on"), "ALL_LIGHTS_ON");
        assert_eq!(token("toggle light eight"), "LIGHT8_TOGGLE");
        assert_eq!(token("what can i say"), "HELP");
        assert_eq!(token("check connection"), "TEST");
    }

    #[test]
    fn test_normalization() {
        assert_eq!(token("  Turn   ON Light Two. "), "LIGHT2_ON");
    }

    #[test]
    fn test_contained_phrase() {
        assert_eq!(token("could you turn off light four please"), "LIGHT4_OFF");
        assert_eq!(token("hey show status now"), "STATUS");
    }

    #[test]
    fn test_regex_fallback() {
        assert_eq!(token("please toggle switch five now"), "LIGHT5_TOGGLE");
        assert_eq!(token("lamp 6 enable"), "LIGHT6_ON");
        assert_eq!(token("stop device seven"), "LIGHT7_OFF");
    }

    #[test]
    fn test_number_words_are_not_action_keywords() {
        // "one" must not be read as containing "on"
        assert_eq!(token("toggle lamp one"), "LIGHT1_TOGGLE");
    }

    #[test]
    fn test_out_of_range_switch_is_unknown() {
        assert_eq!(token("lamp 9 on"), "UNKNOWN_COMMAND");
        assert_eq!(token("turn on light 10"), "UNKNOWN_COMMAND");
    }

    #[test]
    fn test_all_lights_fallback() {
        assert_eq!(token("please put all the lights on"), "ALL_LIGHTS_ON");
        assert_eq!(token("every light should be off"), "ALL_LIGHTS_OFF");
    }

    #[test]
    fn test_unknown() {
        assert_eq!(token("make coffee"), "UNKNOWN_COMMAND");
        assert_eq!(token("   "), "UNKNOWN_COMMAND");
    }

    #[test]
    fn test_available_commands_sorted() {
        let commands = VoiceCommandMapper::new().available_commands();
        assert!(commands.windows(2).all(|w| w[0].0 <= w[1].0));
        assert!(commands
            .iter()
            .any(|(p, c)| p == "lights off" && *c == CanonicalCommand::AllLights { on: false }));
    }
}
