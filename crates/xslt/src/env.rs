//! The run-time services a pattern or key lookup needs from whoever is driving it.

use crate::config::RecoveryPolicy;
use crate::error::{Diagnostic, DiagnosticKind, Location, XsltError};
use crate::key_manager::KeyManager;
use std::sync::Arc;
use weft_tree::{Document, NameId, Node};
use weft_xpath::{EvaluationContext, Expression, MapHost, XPathValue};

pub trait DynamicContext {
    fn evaluate(
        &mut self,
        expr: &Expression,
        focus: &EvaluationContext,
    ) -> Result<XPathValue, XsltError>;

    fn select_by_key(
        &mut self,
        key: NameId,
        document: &Arc<Document>,
        value: &str,
    ) -> Result<Vec<Node>, XsltError>;

    fn recovery_policy(&self) -> RecoveryPolicy;

    /// Handles a recoverable error according to the policy. Returns the error back when
    /// the run must stop.
    fn report_recoverable(&mut self, err: XsltError) -> Result<(), XsltError>;
}

/// Applies `policy` to `err`. Errors that are not recoverable always come back.
pub fn apply_policy(
    policy: RecoveryPolicy,
    err: XsltError,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<(), XsltError> {
    if !err.is_recoverable() {
        return Err(err);
    }
    match policy {
        RecoveryPolicy::Silent => Ok(()),
        RecoveryPolicy::Warn => {
            log::warn!("{}", err);
            diagnostics.push(Diagnostic {
                kind: DiagnosticKind::Warning,
                message: err.to_string(),
            });
            Ok(())
        }
        RecoveryPolicy::Strict => Err(err),
    }
}

/// A context for matching patterns outside a transformation: variables come from a
/// [`MapHost`], keys from an optional [`KeyManager`].
pub struct StandaloneContext<'k> {
    host: MapHost,
    keys: Option<&'k KeyManager>,
    policy: RecoveryPolicy,
    diagnostics: Vec<Diagnostic>,
}

impl<'k> StandaloneContext<'k> {
    pub fn new(policy: RecoveryPolicy) -> Self {
        Self {
            host: MapHost::new(),
            keys: None,
            policy,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_host(mut self, host: MapHost) -> Self {
        self.host = host;
        self
    }

    pub fn with_keys(mut self, keys: &'k KeyManager) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

impl DynamicContext for StandaloneContext<'_> {
    fn evaluate(
        &mut self,
        expr: &Expression,
        focus: &EvaluationContext,
    ) -> Result<XPathValue, XsltError> {
        Ok(weft_xpath::evaluate(expr, focus, &mut self.host)?)
    }

    fn select_by_key(
        &mut self,
        key: NameId,
        document: &Arc<Document>,
        value: &str,
    ) -> Result<Vec<Node>, XsltError> {
        match self.keys {
            Some(keys) => keys.select_by_key(key, document, value, self),
            None => Err(XsltError::unresolved(
                format!("key '{}' is not defined", document.name_pool().local_name(key)),
                Location::default(),
            )),
        }
    }

    fn recovery_policy(&self) -> RecoveryPolicy {
        self.policy
    }

    fn report_recoverable(&mut self, err: XsltError) -> Result<(), XsltError> {
        apply_policy(self.policy, err, &mut self.diagnostics)
    }
}
