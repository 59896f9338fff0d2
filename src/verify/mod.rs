//! Verification engine
//!
//! A `Check` is a named list of rules over one `NormalizedResponse`. Rules
//! never panic and never short-circuit each other: `evaluate` reports every
//! rule that did not hold, `verify` only the first. `GroupCheck` applies a
//! check across responses that were issued concurrently.

mod rules;

use std::fmt;
use std::sync::Arc;

pub use rules::*;

use crate::error::{AssertionFailure, Verdict};
use crate::response::NormalizedResponse;

/// Canonical form of a header value: whitespace around `;` and `,` removed,
/// outer whitespace trimmed. Every header comparison goes through here.
pub fn normalize_header_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut after_separator = false;
    for c in value.trim().chars() {
        match c {
            ';' | ',' => {
                out.truncate(out.trim_end().len());
                out.push(c);
                after_separator = true;
            }
            c if c.is_whitespace() && after_separator => {}
            c => {
                out.push(c);
                after_separator = false;
            }
        }
    }
    out
}

type RuleFn = Arc<dyn Fn(&NormalizedResponse) -> Verdict + Send + Sync>;

/// A named, composable set of rules
#[derive(Clone)]
pub struct Check {
    label: String,
    rules: Vec<RuleFn>,
}

impl Check {
    /// A check holding one rule
    pub fn rule<F>(label: impl Into<String>, rule: F) -> Self
    where
        F: Fn(&NormalizedResponse) -> Verdict + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            rules: vec![Arc::new(rule)],
        }
    }

    /// A check with no rules; always passes
    pub fn empty(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            rules: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rename; failures report as `label/rule`
    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Append `other`'s rules. Failures from `other` keep its label as a prefix.
    pub fn and(mut self, other: Check) -> Self {
        let prefix = other.label.clone();
        for rule in other.rules {
            let prefix = prefix.clone();
            self.rules
                .push(Arc::new(move |resp| rule(resp).map_err(|f| f.within(&prefix))));
        }
        self
    }

    /// Every rule that did not hold, in rule order
    pub fn evaluate(&self, resp: &NormalizedResponse) -> Vec<AssertionFailure> {
        self.rules
            .iter()
            .filter_map(|rule| rule(resp).err())
            .map(|failure| failure.within(&self.label))
            .collect()
    }

    /// The first rule that did not hold
    pub fn verify(&self, resp: &NormalizedResponse) -> Verdict {
        match self.evaluate(resp).into_iter().next() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    pub fn passes(&self, resp: &NormalizedResponse) -> bool {
        self.rules.iter().all(|rule| rule(resp).is_ok())
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check")
            .field("label", &self.label)
            .field("rules", &self.rules.len())
            .finish()
    }
}

/// A check applied to a set of concurrent responses
#[derive(Debug, Clone)]
pub enum GroupCheck {
    /// Every response passes
    Each(Check),
    /// Exactly one response passes (single-flight)
    ExactlyOne(Check),
}

pub fn each(check: Check) -> GroupCheck {
    GroupCheck::Each(check)
}

pub fn exactly_one(check: Check) -> GroupCheck {
    GroupCheck::ExactlyOne(check)
}

impl GroupCheck {
    pub fn evaluate(&self, responses: &[NormalizedResponse]) -> Vec<AssertionFailure> {
        match self {
            GroupCheck::Each(check) => responses
                .iter()
                .enumerate()
                .flat_map(|(i, resp)| {
                    check
                        .evaluate(resp)
                        .into_iter()
                        .map(move |f| f.within(&format!("response[{}]", i)))
                })
                .collect(),
            GroupCheck::ExactlyOne(check) => {
                let passing = responses.iter().filter(|r| check.passes(r)).count();
                if passing == 1 {
                    Vec::new()
                } else {
                    vec![AssertionFailure::new(
                        format!("exactly_one({})", check.label()),
                        "1 matching response",
                        format!("{} of {}", passing, responses.len()),
                    )]
                }
            }
        }
    }
}

/// Failures gathered by free-form steps
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Findings {
    failures: Vec<AssertionFailure>,
}

impl Findings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, failure: AssertionFailure) {
        self.failures.push(failure);
    }

    pub fn verdict(&mut self, verdict: Verdict) {
        if let Err(failure) = verdict {
            self.failures.push(failure);
        }
    }

    /// Run `check` against `resp`, keeping every failure
    pub fn check(&mut self, check: &Check, resp: &NormalizedResponse) {
        self.failures.extend(check.evaluate(resp));
    }

    pub fn expect(
        &mut self,
        condition: bool,
        rule: &str,
        expected: impl Into<String>,
        observed: impl Into<String>,
    ) {
        if !condition {
            self.push(AssertionFailure::new(rule, expected, observed));
        }
    }

    pub fn expect_eq<T: PartialEq + fmt::Debug>(&mut self, rule: &str, expected: T, observed: T) {
        if expected != observed {
            self.push(AssertionFailure::new(
                rule,
                format!("{:?}", expected),
                format!("{:?}", observed),
            ));
        }
    }

    pub fn extend(&mut self, failures: impl IntoIterator<Item = AssertionFailure>) {
        self.failures.extend(failures);
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn into_failures(self) -> Vec<AssertionFailure> {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Headers;

    fn response(status: u16, headers: &[(&str, &str)], body: &str) -> NormalizedResponse {
        NormalizedResponse::new(
            status,
            headers.iter().copied().collect::<Headers>(),
            body.as_bytes().to_vec(),
        )
    }

    #[test]
    fn test_normalize_header_value() {
        assert_eq!(
            normalize_header_value("text/plain; charset=UTF-8"),
            "text/plain;charset=UTF-8"
        );
        assert_eq!(
            normalize_header_value(" no-store , no-cache,max-age=0 "),
            "no-store,no-cache,max-age=0"
        );
        assert_eq!(normalize_header_value("a ;b, c"), "a;b,c");
        assert_eq!(normalize_header_value(""), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_header_value("a ; b ,  c");
        assert_eq!(normalize_header_value(&once), once);
    }

    #[test]
    fn test_check_evaluate_collects_all() {
        let check = expect_status(200).and(expect_no_body()).labelled("greeting");
        let failures = check.evaluate(&response(404, &[], "oops"));
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].rule, "greeting/status");
        assert_eq!(failures[1].rule, "greeting/body");

        let first = check.verify(&response(404, &[], "oops")).unwrap_err();
        assert_eq!(first, failures[0]);
        assert!(check.verify(&response(200, &[], "")).is_ok());
    }

    #[test]
    fn test_and_keeps_inner_label() {
        let check = Check::empty("outer").and(expect_status(204).labelled("inner"));
        let failures = check.evaluate(&response(200, &[], ""));
        assert_eq!(failures[0].rule, "outer/inner/status");
    }

    #[test]
    fn test_each_reports_index() {
        let responses = vec![response(200, &[], ""), response(500, &[], "")];
        let failures = each(expect_status(200)).evaluate(&responses);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].rule, "response[1]/status");
    }

    #[test]
    fn test_exactly_one() {
        let one = vec![
            response(200, &[], "o\n"),
            response(200, &[], "c[2010,\"Another connection still open\"]\n"),
        ];
        let check = exactly_one(expect_body_equals("o\n"));
        assert!(check.evaluate(&one).is_empty());

        let both = vec![response(200, &[], "o\n"), response(200, &[], "o\n")];
        let failures = check.evaluate(&both);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].observed, "2 of 2");
    }

    #[test]
    fn test_findings() {
        let mut findings = Findings::new();
        findings.expect(true, "fine", "x", "x");
        findings.expect_eq("echo", "a", "b");
        findings.check(&expect_status(200), &response(404, &[], ""));
        findings.verdict(Ok(()));
        assert_eq!(findings.len(), 2);
        let failures = findings.into_failures();
        assert_eq!(failures[0].expected, "\"a\"");
        assert_eq!(failures[1].rule, "status");
    }
}
