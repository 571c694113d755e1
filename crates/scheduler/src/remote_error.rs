use lookout_core::LookoutError;
use lookout_remote::RemoteError;

/// Attach operation and target to a remote failure.
///
/// Validation rejections (e.g. an upload frequency the model was not trained
/// at) surface as configuration errors; everything else the call could not
/// complete is a transport failure.
pub(crate) fn remote_failure(operation: &'static str, target: &str, err: RemoteError) -> LookoutError {
    match err {
        RemoteError::Validation(reason) => LookoutError::InvalidConfiguration {
            field: operation,
            value: target.to_string(),
            reason,
        },
        other => LookoutError::TransportFailure {
            operation,
            target: target.to_string(),
            message: other.to_string(),
        },
    }
}
