use crate::native::{Category, ReturnCode, RETURN_SUCCESS};

/// Errors that can occur when talking to the ClientKit library.
///
/// The native layer only reports success or failure, so variants carry the
/// call site rather than a native cause.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Could not resolve interface path '{0}'")]
    InvalidPath(String),

    #[error("Native call {0} failed")]
    NativeCall(&'static str),

    #[error("Context update failed")]
    Update,

    #[error("{0} used after dispose")]
    UseAfterDispose(&'static str),

    #[error("{0:?} interfaces have no state accessor")]
    NoStateAccessor(Category),

    #[error("{0:?} interfaces have no report callback")]
    NoCallback(Category),

    #[error("Report stream closed")]
    StreamClosed,

    #[error("Timeout waiting for report")]
    Timeout,
}

/// Map a native return code onto `NativeCall` for the named call.
pub(crate) fn check(code: ReturnCode, call: &'static str) -> crate::Result<()> {
    if code == RETURN_SUCCESS {
        Ok(())
    } else {
        Err(ClientError::NativeCall(call))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::RETURN_FAILURE;

    #[test]
    fn test_check_maps_codes() {
        assert!(check(RETURN_SUCCESS, "osvrClientUpdate").is_ok());
        match check(RETURN_FAILURE, "osvrClientFreeInterface") {
            Err(ClientError::NativeCall(call)) => assert_eq!(call, "osvrClientFreeInterface"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ClientError::InvalidPath("/me/hands/left".into()).to_string(),
            "Could not resolve interface path '/me/hands/left'"
        );
        assert_eq!(
            ClientError::UseAfterDispose("Context").to_string(),
            "Context used after dispose"
        );
    }
}
