use http::StatusCode;

/// Error that knows how it surfaces over HTTP
///
/// Relay failures reach callers either as an `{"error": "<message>"}` body
/// or, once a stream is open, as an in-band error record. Both renderings
/// read from this trait so error types stay free of axum.
pub trait HttpError: std::error::Error {
    fn status_code(&self) -> StatusCode;

    /// Short category carried by in-band error records, such as `upstream_error`
    fn error_type(&self) -> &str;

    /// Text shown to the caller; never includes credentials
    fn client_message(&self) -> String {
        self.to_string()
    }
}
