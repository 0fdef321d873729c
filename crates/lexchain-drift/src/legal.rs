//! Offline legal-reference validation.
//!
//! Grammar accepted per authority:
//!
//! - **ELI**: `http(s)://<host>/eli/<type>/<segment>/...`, e.g.
//!   `http://data.europa.eu/eli/reg/2016/679/oj`.
//! - **CELEX**: a bare number (`32016R0679`), optionally prefixed with
//!   `CELEX:`, or an EUR-Lex URL carrying `uri=CELEX:<number>`. The number is
//!   a sector (`1`-`9`, `C` or `E`), a four-digit year, a one- or two-letter
//!   document type and a four-digit sequence, with an optional `(NN)` suffix.
//!
//! Liveness cannot be checked offline; instead the validator can be given a
//! list of references known to be repealed, which it reports as dead.

use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;

use lexchain_contracts::function::{LegalAuthority, LegalReference};
use lexchain_core::traits::{LegalReferenceValidator, ReferenceStatus};

static ELI_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[A-Za-z0-9.-]+(:\d+)?/eli/[a-z0-9_-]+(/[A-Za-z0-9_.:-]+)+/?$")
        .expect("ELI grammar is a valid regex")
});

static CELEX_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[1-9CE]\d{4}[A-Z]{1,2}\d{4}(\(\d{2}\))?$").expect("CELEX grammar is a valid regex")
});

/// Checks ELI and CELEX grammar, and a caller-supplied repeal list.
#[derive(Debug, Clone, Default)]
pub struct GrammarReferenceValidator {
    repealed: HashSet<String>,
}

impl GrammarReferenceValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat each of `uris` as repealed. Matching is on the exact URI text.
    pub fn with_repealed<I, S>(mut self, uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.repealed.extend(uris.into_iter().map(Into::into));
        self
    }

    fn check_grammar(reference: &LegalReference) -> Result<(), String> {
        let uri = reference.uri.trim();
        match reference.authority {
            LegalAuthority::Eli => {
                if ELI_URI.is_match(uri) {
                    Ok(())
                } else {
                    Err(format!("'{uri}' is not a valid ELI URI"))
                }
            }
            LegalAuthority::Celex => {
                let number = celex_number(uri);
                if CELEX_NUMBER.is_match(number) {
                    Ok(())
                } else {
                    Err(format!("'{uri}' does not carry a valid CELEX number"))
                }
            }
        }
    }
}

/// The CELEX number embedded in `uri`, or `uri` itself if none is marked.
fn celex_number(uri: &str) -> &str {
    let tail = match uri.find("CELEX:") {
        Some(pos) => &uri[pos + "CELEX:".len()..],
        None => uri,
    };
    tail.split(['&', '#']).next().unwrap_or(tail)
}

impl LegalReferenceValidator for GrammarReferenceValidator {
    fn check(&self, reference: &LegalReference) -> ReferenceStatus {
        if let Err(reason) = Self::check_grammar(reference) {
            return ReferenceStatus::Malformed(reason);
        }
        if self.repealed.contains(reference.uri.trim()) {
            return ReferenceStatus::Dead(format!("'{}' has been repealed", reference.uri));
        }
        ReferenceStatus::Valid
    }
}
