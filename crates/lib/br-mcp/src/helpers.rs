use std::borrow::Cow;

use br_core::control::ControlError;
use rmcp::ErrorData;
use rmcp::model::ErrorCode;

pub(crate) fn mcp_err(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> ErrorData {
    ErrorData {
        code,
        message: message.into(),
        data: None,
    }
}

pub(crate) fn map_err(err: ControlError) -> ErrorData {
    let code = match err {
        ControlError::InvalidInput(_) | ControlError::Filter(_) => ErrorCode::INVALID_PARAMS,
        ControlError::Store(_) | ControlError::Timeout(_) => ErrorCode::INTERNAL_ERROR,
    };
    mcp_err(code, err.to_string())
}
