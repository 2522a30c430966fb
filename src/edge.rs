//! HTTP transport to the sandbox edge API.
//!
//! [`EdgeService`] sends one request per remote operation and classifies the answer into exactly
//! one [`EdgeResponse`]. It also carries the visitor passport: the stored passport is attached to
//! every request and a passport found on any response replaces the stored one before the outcome
//! is returned.
use std::{fmt, sync::Arc};

use reqwest::{header::USER_AGENT, Method, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{local_storage::LocalStorage, Config, Error, Result, SdkMetadata};

/// Header carrying the visitor passport in both directions.
pub const VISITOR_HEADER: &str = "X-Optable-Visitor";

/// Query parameter carrying the SDK identity.
const OSDK_PARAM: &str = "osdk";

/// Outcome of a remote sandbox operation.
#[derive(Debug, Clone)]
pub enum EdgeResponse<T> {
    /// The sandbox accepted the request.
    Success(T),
    /// The sandbox rejected the request with an error payload.
    ApiError {
        /// Decoded error payload.
        body: ApiErrorBody,
        /// HTTP status code.
        code: u16,
    },
    /// No HTTP exchange completed (connection refused, DNS failure, timeout, ...).
    NetworkError(Error),
    /// Anything else, e.g. a success status with an empty or unparseable body.
    UnknownError(Option<Error>),
}

/// Error payload returned by the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Human-readable error message.
    pub error: String,
    /// Trace token to quote when reporting the error.
    #[serde(default)]
    pub trace: String,
}

impl fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (trace: {})", self.error, self.trace)
    }
}

/// Failure half of [`EdgeResponse::into_result`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResponseError {
    /// See [`EdgeResponse::ApiError`].
    #[error("{body} (code: {code})")]
    Api {
        /// Decoded error payload.
        body: ApiErrorBody,
        /// HTTP status code.
        code: u16,
    },
    /// See [`EdgeResponse::NetworkError`].
    #[error("network error")]
    Network(#[source] Error),
    /// See [`EdgeResponse::UnknownError`].
    #[error("unknown error")]
    Unknown(Option<Error>),
}

impl<T> EdgeResponse<T> {
    /// Whether this is [`EdgeResponse::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, EdgeResponse::Success(_))
    }

    /// The success payload, if any.
    pub fn success(self) -> Option<T> {
        match self {
            EdgeResponse::Success(data) => Some(data),
            _ => None,
        }
    }

    /// Description of a failure, `None` on success.
    ///
    /// ```
    /// # use optable::{ApiErrorBody, EdgeResponse};
    /// let response: EdgeResponse<()> = EdgeResponse::ApiError {
    ///     body: ApiErrorBody { error: "bad request".to_owned(), trace: "t1".to_owned() },
    ///     code: 400,
    /// };
    /// assert_eq!(response.message().as_deref(), Some("bad request (trace: t1)"));
    /// ```
    pub fn message(&self) -> Option<String> {
        match self {
            EdgeResponse::Success(_) => None,
            EdgeResponse::ApiError { body, .. } => Some(body.to_string()),
            EdgeResponse::NetworkError(_) => Some("NetworkError (trace: None)".to_owned()),
            EdgeResponse::UnknownError(_) => Some("UnknownError (trace: None)".to_owned()),
        }
    }

    /// Convert into a standard `Result`.
    pub fn into_result(self) -> std::result::Result<T, ResponseError> {
        match self {
            EdgeResponse::Success(data) => Ok(data),
            EdgeResponse::ApiError { body, code } => Err(ResponseError::Api { body, code }),
            EdgeResponse::NetworkError(err) => Err(ResponseError::Network(err)),
            EdgeResponse::UnknownError(err) => Err(ResponseError::Unknown(err)),
        }
    }

    /// Map the success payload.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> EdgeResponse<U> {
        match self {
            EdgeResponse::Success(data) => EdgeResponse::Success(f(data)),
            EdgeResponse::ApiError { body, code } => EdgeResponse::ApiError { body, code },
            EdgeResponse::NetworkError(err) => EdgeResponse::NetworkError(err),
            EdgeResponse::UnknownError(err) => EdgeResponse::UnknownError(err),
        }
    }
}

/// HTTP client of the sandbox edge API.
pub(crate) struct EdgeService {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::Client,
    base_url: Url,
    app: String,
    user_agent: String,
    osdk: String,
    storage: Arc<LocalStorage>,
}

impl EdgeService {
    pub fn new(
        config: &Config,
        user_agent: String,
        sdk_metadata: &SdkMetadata,
        storage: Arc<LocalStorage>,
    ) -> Result<EdgeService> {
        let base_url = Url::parse(&config.edge_base_url()).map_err(Error::InvalidBaseUrl)?;

        Ok(EdgeService {
            client: reqwest::Client::new(),
            base_url,
            app: config.app().to_owned(),
            user_agent,
            osdk: sdk_metadata.osdk(),
            storage,
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> EdgeResponse<T> {
        self.send(Method::GET, endpoint, None::<&()>).await
    }

    pub async fn post<T, B>(&self, endpoint: &str, body: Option<&B>) -> EdgeResponse<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(Method::POST, endpoint, body).await
    }

    /// `{base}/{app}/{endpoint}?osdk=...`
    fn endpoint_url(&self, endpoint: &str) -> Url {
        let mut url = self.base_url.clone();
        // http(s) URLs always have path segments.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&self.app).push(endpoint);
        }
        url.query_pairs_mut().append_pair(OSDK_PARAM, &self.osdk);
        url
    }

    async fn send<T, B>(&self, method: Method, endpoint: &str, body: Option<&B>) -> EdgeResponse<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.endpoint_url(endpoint);
        let mut request = self
            .client
            .request(method, url)
            .header(USER_AGENT, &self.user_agent);

        match self.storage.get_passport() {
            Ok(Some(passport)) => request = request.header(VISITOR_HEADER, passport),
            Ok(None) => {}
            Err(err) => {
                log::warn!(target: "optable", endpoint; "failed to read visitor passport, sending without it: {:?}", err);
            }
        }

        if let Some(body) = body {
            request = request.json(body);
        }

        log::debug!(target: "optable", endpoint; "sending request");
        let response = match request.send().await {
            Ok(response) => response,
            // Builder errors (bad header value, body serialization) never reached the network.
            Err(err) if err.is_builder() => {
                log::warn!(target: "optable", endpoint; "failed to build request: {:?}", err);
                return EdgeResponse::UnknownError(Some(err.into()));
            }
            Err(err) => {
                log::warn!(target: "optable", endpoint; "error while sending request: {:?}", err);
                return EdgeResponse::NetworkError(err.into());
            }
        };

        self.store_passport(endpoint, &response);

        let status = response.status();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => {
                log::warn!(target: "optable", endpoint, status = status.as_u16(); "error while reading response body: {:?}", err);
                return EdgeResponse::NetworkError(err.into());
            }
        };

        let response = classify(status, &body);
        match &response {
            EdgeResponse::Success(_) => {
                log::debug!(target: "optable", endpoint, status = status.as_u16(); "request succeeded");
            }
            EdgeResponse::ApiError { body, code } => {
                log::warn!(target: "optable", endpoint, code = *code; "sandbox returned an error: {}", body);
            }
            EdgeResponse::NetworkError(err) => {
                log::warn!(target: "optable", endpoint, status = status.as_u16(); "unexpected response: {:?}", err);
            }
            EdgeResponse::UnknownError(err) => {
                log::warn!(target: "optable", endpoint, status = status.as_u16(); "unexpected response: {:?}", err);
            }
        }
        response
    }

    fn store_passport(&self, endpoint: &str, response: &reqwest::Response) {
        let Some(passport) = response.headers().get(VISITOR_HEADER) else {
            return;
        };

        match passport.to_str() {
            Ok(passport) => {
                if let Err(err) = self.storage.set_passport(passport) {
                    log::warn!(target: "optable", endpoint; "failed to store visitor passport: {:?}", err);
                }
            }
            Err(_) => {
                log::warn!(target: "optable", endpoint; "ignoring non-ASCII visitor passport");
            }
        }
    }
}

/// Classify an HTTP exchange that completed with `status` and `body`.
fn classify<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> EdgeResponse<T> {
    if status.is_success() {
        if body.is_empty() {
            return EdgeResponse::UnknownError(Some(Error::EmptyBody));
        }
        return match serde_json::from_slice(body) {
            Ok(data) => EdgeResponse::Success(data),
            Err(err) => EdgeResponse::UnknownError(Some(err.into())),
        };
    }

    if body.is_empty() {
        return EdgeResponse::UnknownError(Some(Error::EmptyBody));
    }
    match serde_json::from_slice::<ApiErrorBody>(body) {
        Ok(body) => EdgeResponse::ApiError {
            body,
            code: status.as_u16(),
        },
        Err(err) => EdgeResponse::UnknownError(Some(err.into())),
    }
}
