//! Ranked password dictionary.
//!
//! Candidates are tried in file order. The no-password candidate is always
//! first regardless of dictionary content, and duplicates are dropped so a
//! sloppy wordlist does not cost repeat decryption attempts.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::models::PasswordCandidate;

/// Ordered, deduplicated candidate list.
#[derive(Debug, Clone)]
pub struct PasswordDictionary {
    secrets: Vec<Option<String>>,
}

impl PasswordDictionary {
    /// Load from a plain text file, one password per line, trimmed. A missing
    /// file is not fatal: processing proceeds with only the empty candidate.
    pub fn load(path: &Path) -> Self {
        let mut secrets: Vec<Option<String>> = vec![None];
        let mut seen: HashSet<String> = HashSet::new();

        match fs::read_to_string(path) {
            Ok(contents) => {
                for line in contents.lines() {
                    let password = line.trim();
                    if password.is_empty() {
                        continue;
                    }
                    if seen.insert(password.to_string()) {
                        secrets.push(Some(password.to_string()));
                    }
                }
                info!(
                    "Loaded {} password candidates from {}",
                    secrets.len() - 1,
                    path.display()
                );
            }
            Err(e) => {
                warn!(
                    "Password file {} unavailable ({}); trying extraction without a password only",
                    path.display(),
                    e
                );
            }
        }

        Self { secrets }
    }

    /// Build directly from literals, mainly for tests. The empty candidate is
    /// still prepended.
    pub fn from_passwords<I, S>(passwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut secrets: Vec<Option<String>> = vec![None];
        let mut seen = HashSet::new();
        for p in passwords {
            let p = p.into();
            let trimmed = p.trim().to_string();
            if !trimmed.is_empty() && seen.insert(trimmed.clone()) {
                secrets.push(Some(trimmed));
            }
        }
        Self { secrets }
    }

    /// Number of candidates including the leading empty one.
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        false // the empty candidate is always present
    }

    /// Candidates in try order.
    pub fn candidates(&self) -> impl Iterator<Item = PasswordCandidate> + '_ {
        self.secrets
            .iter()
            .enumerate()
            .map(|(index, secret)| PasswordCandidate { index, secret: secret.clone() })
    }
}
