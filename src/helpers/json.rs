use actix_web::error::InternalError;
use actix_web::http::StatusCode;
use actix_web::{web, Error, HttpResponse};
use serde::Serialize;

/// Envelope shared by every JSON response: `{status, message, code, data?, list?}`.
#[derive(Debug, Serialize)]
pub struct JsonResponse<T> {
    pub status: String,
    pub message: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list: Option<Vec<T>>,
}

pub struct JsonResponseBuilder<T> {
    message: String,
    data: Option<T>,
    list: Option<Vec<T>>,
}

impl<T> Default for JsonResponseBuilder<T> {
    fn default() -> Self {
        Self {
            message: String::new(),
            data: None,
            list: None,
        }
    }
}

impl<T> JsonResponse<T> {
    pub fn build() -> JsonResponseBuilder<T> {
        JsonResponseBuilder::default()
    }
}

impl<T> JsonResponseBuilder<T>
where
    T: Serialize,
{
    pub fn set_msg<S: Into<String>>(mut self, message: S) -> Self {
        self.message = message.into();
        self
    }

    pub fn set_data(mut self, data: T) -> Self {
        self.data = Some(data);
        self
    }

    pub fn set_list(mut self, list: Vec<T>) -> Self {
        self.list = Some(list);
        self
    }

    fn into_envelope(self, code: StatusCode) -> JsonResponse<T> {
        let status = if code.is_success() { "success" } else { "error" };
        let message = if self.message.trim().is_empty() {
            code.canonical_reason().unwrap_or("").to_string()
        } else {
            self.message
        };

        JsonResponse {
            status: status.to_string(),
            message,
            code: code.as_u16(),
            data: self.data,
            list: self.list,
        }
    }

    /// Render the envelope with an arbitrary status code.
    pub fn respond(self, code: StatusCode) -> HttpResponse {
        HttpResponse::build(code).json(self.into_envelope(code))
    }

    pub fn ok<S: Into<String>>(self, message: S) -> web::Json<JsonResponse<T>> {
        web::Json(self.set_msg(message).into_envelope(StatusCode::OK))
    }

    fn error<S: Into<String>>(self, code: StatusCode, message: S) -> Error {
        let message = message.into();
        let response = self.set_msg(message.clone()).respond(code);
        InternalError::from_response(message, response).into()
    }

    pub fn bad_request<S: Into<String>>(self, message: S) -> Error {
        self.error(StatusCode::BAD_REQUEST, message)
    }

    pub fn form_error<S: Into<String>>(self, message: S) -> Error {
        self.error(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn unauthorized<S: Into<String>>(self, message: S) -> Error {
        self.error(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found<S: Into<String>>(self, message: S) -> Error {
        self.error(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict<S: Into<String>>(self, message: S) -> Error {
        self.error(StatusCode::CONFLICT, message)
    }

    pub fn internal_server_error<S: Into<String>>(self, message: S) -> Error {
        self.error(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}
