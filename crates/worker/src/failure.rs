use std::any::Any;

use tokio::task::JoinError;

/// Reason a background execution produced no value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionFailure {
	/// The job panicked; carries the panic payload when it was a string.
	#[error("background job panicked: {0}")]
	Panicked(String),
	/// The runtime dropped the job before it finished (shutdown or abort).
	#[error("background job was cancelled by the runtime")]
	Aborted,
}

impl From<JoinError> for ExecutionFailure {
	fn from(err: JoinError) -> Self {
		match join_error_panic_message(err) {
			Some(msg) => Self::Panicked(msg),
			None => Self::Aborted,
		}
	}
}

/// Extracts a readable panic message from a [`JoinError`], if it was a panic.
fn join_error_panic_message(err: JoinError) -> Option<String> {
	let payload = err.try_into_panic().ok()?;
	Some(panic_payload_message(payload.as_ref()))
}

/// Renders a caught panic payload, falling back to a placeholder for non-string payloads.
pub fn panic_payload_message(payload: &(dyn Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&'static str>() {
		(*s).to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"<non-string panic payload>".to_string()
	}
}
