//! Readiness signature table
//!
//! Entries are tried in order and the first match wins. Configured extra
//! entries come after the built-ins, so they can add phrases but never
//! change how a built-in phrase classifies.

use df_core::config::{ExtraSignature, SignatureClass};

/// Case-insensitive phrase and the outcome it signals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    phrase: String,
    pub class: SignatureClass,
}

impl Signature {
    pub fn new(phrase: &str, class: SignatureClass) -> Self {
        Self {
            phrase: phrase.to_lowercase(),
            class,
        }
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    fn matches(&self, lowered: &str) -> bool {
        lowered.contains(&self.phrase)
    }
}

const BUILTIN: &[(&str, SignatureClass)] = &[
    ("websocket server settings", SignatureClass::Ready),
    ("proxying from", SignatureClass::Ready),
    ("permission denied", SignatureClass::Authentication),
    ("authentication failed", SignatureClass::Authentication),
    ("connection refused", SignatureClass::ConnectionRefused),
    ("no route to host", SignatureClass::NoRoute),
    ("host key verification failed", SignatureClass::HostKey),
    ("remote host identification has changed", SignatureClass::HostKey),
    ("command not found", SignatureClass::MissingDependency),
    ("cannot open display", SignatureClass::NoDisplay),
    ("xopendisplay failed", SignatureClass::NoDisplay),
    ("bad configuration option", SignatureClass::Configuration),
    ("unknown option", SignatureClass::Configuration),
    ("unrecognized option", SignatureClass::Configuration),
    ("illegal option", SignatureClass::Configuration),
];

/// Ordered list of signatures
#[derive(Debug, Clone)]
pub struct SignatureTable {
    entries: Vec<Signature>,
}

impl SignatureTable {
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN
                .iter()
                .map(|(phrase, class)| Signature::new(phrase, *class))
                .collect(),
        }
    }

    /// Built-ins followed by `extra`
    pub fn with_extra(extra: &[ExtraSignature]) -> Self {
        let mut table = Self::builtin();
        for signature in extra {
            table.push(Signature::new(&signature.phrase, signature.class));
        }
        table
    }

    pub fn push(&mut self, signature: Signature) {
        self.entries.push(signature);
    }

    pub fn entries(&self) -> &[Signature] {
        &self.entries
    }

    /// Class of the first entry matching `line`
    pub fn classify(&self, line: &str) -> Option<SignatureClass> {
        let lowered = line.to_lowercase();
        self.entries
            .iter()
            .find(|entry| entry.matches(&lowered))
            .map(|entry| entry.class)
    }

    /// Class of the first entry found anywhere in `text`
    pub fn scan(&self, text: &str) -> Option<SignatureClass> {
        self.classify(text)
    }
}

impl Default for SignatureTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_phrases() {
        let table = SignatureTable::builtin();
        assert_eq!(
            table.classify("WebSocket server settings:"),
            Some(SignatureClass::Ready)
        );
        assert_eq!(
            table.classify("admin@192.168.0.101: Permission denied (publickey,password)."),
            Some(SignatureClass::Authentication)
        );
        assert_eq!(
            table.classify("ssh: connect to host 192.168.0.9 port 22: No route to host"),
            Some(SignatureClass::NoRoute)
        );
        assert_eq!(
            table.classify("bash: line 4: x11vnc: command not found"),
            Some(SignatureClass::MissingDependency)
        );
        assert_eq!(table.classify("Warning: Permanently added"), None);
    }

    #[test]
    fn test_first_match_wins() {
        let table = SignatureTable::builtin();
        // Both a ready and a refused phrase; ready comes first in the table.
        assert_eq!(
            table.classify("proxying from :6080 after connection refused"),
            Some(SignatureClass::Ready)
        );
    }

    #[test]
    fn test_extra_signatures_are_appended() {
        let table = SignatureTable::with_extra(&[
            ExtraSignature {
                phrase: "Listening on 6080".into(),
                class: SignatureClass::Ready,
            },
            ExtraSignature {
                phrase: "permission denied".into(),
                class: SignatureClass::Configuration,
            },
        ]);
        assert_eq!(table.classify("listening on 6080"), Some(SignatureClass::Ready));
        assert_eq!(
            table.classify("Permission denied"),
            Some(SignatureClass::Authentication)
        );
    }
}
