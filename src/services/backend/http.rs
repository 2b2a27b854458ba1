/// HTTP client for the movigation recommendation backend
///
/// Endpoints:
/// 1. `POST /api/v2/recommend` → two tracks plus the session id
/// 2. `POST /api/v2/recommend/single` → one replacement movie, or none
/// 3. `GET /api/movies/{id}` → details (adult flag)
/// 4. `POST /mypage/satisfaction` → satisfaction signal
/// 5. `POST /api/movies/{id}/play` → playback click
use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{
        ApiMovieDetailEnvelope, MovieDetail, MovieId, PlaybackClickRequest, ReRecommendRequest,
        ReRecommendResponse, RecommendRequest, RecommendResponse, SatisfactionRequest,
    },
    services::backend::{
        request_id::{make_span_with_request_id, RequestId, REQUEST_ID_HEADER},
        RecommendationApi,
    },
};
use reqwest::{Client as HttpClient, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::Instrument;

#[derive(Clone)]
pub struct HttpRecommendationApi {
    http_client: HttpClient,
    api_url: String,
    api_token: Option<String>,
}

impl HttpRecommendationApi {
    pub fn new(api_url: String, api_token: Option<String>, timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        Self::new(
            config.api_base_url.clone(),
            config.api_token.clone(),
            config.request_timeout(),
        )
    }

    fn request(&self, method: Method, path: &str, request_id: &RequestId) -> RequestBuilder {
        let builder = self
            .http_client
            .request(method, format!("{}{}", self.api_url, path))
            .header(REQUEST_ID_HEADER, request_id.as_str());

        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Turns non-2xx responses into `ExternalApi` errors
    async fn check_status(response: Response) -> AppResult<Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %body, "Backend request failed");
        Err(AppError::ExternalApi(format!(
            "Backend returned status {}: {}",
            status, body
        )))
    }

    /// Decodes a body, logging the raw payload when it does not match the schema
    async fn decode<T: DeserializeOwned>(response: Response) -> AppResult<T> {
        let response_text = response.text().await?;
        tracing::debug!(response = %response_text, "Raw backend response");

        serde_json::from_str(&response_text).map_err(|e| {
            tracing::error!(
                error = %e,
                response = %response_text,
                "Failed to deserialize backend response"
            );
            AppError::ExternalApi(format!("Failed to parse backend response: {}", e))
        })
    }
}

#[async_trait::async_trait]
impl RecommendationApi for HttpRecommendationApi {
    async fn recommend(&self, request: &RecommendRequest) -> AppResult<RecommendResponse> {
        let path = "/api/v2/recommend";
        let request_id = RequestId::new();

        async {
            let response = self
                .request(Method::POST, path, &request_id)
                .json(request)
                .send()
                .await?;
            let response: RecommendResponse =
                Self::decode(Self::check_status(response).await?).await?;

            tracing::info!(
                track_a = response.track_a.movies.len(),
                track_b = response.track_b.movies.len(),
                session_id = ?response.session_id,
                "Batch recommendation received"
            );

            Ok::<_, AppError>(response)
        }
        .instrument(make_span_with_request_id("POST", path, &request_id))
        .await
    }

    async fn recommend_single(
        &self,
        request: &ReRecommendRequest,
    ) -> AppResult<ReRecommendResponse> {
        let path = "/api/v2/recommend/single";
        let request_id = RequestId::new();

        async {
            let response = self
                .request(Method::POST, path, &request_id)
                .json(request)
                .send()
                .await?;
            let response: ReRecommendResponse =
                Self::decode(Self::check_status(response).await?).await?;

            tracing::info!(
                track = %request.track,
                target_runtime = request.target_runtime,
                success = response.success,
                "Single recommendation received"
            );

            Ok::<_, AppError>(response)
        }
        .instrument(make_span_with_request_id("POST", path, &request_id))
        .await
    }

    async fn movie_detail(&self, movie_id: MovieId) -> AppResult<MovieDetail> {
        let path = format!("/api/movies/{}", movie_id);
        let request_id = RequestId::new();

        async {
            let response = self
                .request(Method::GET, &path, &request_id)
                .send()
                .await?;
            let envelope: ApiMovieDetailEnvelope =
                Self::decode(Self::check_status(response).await?).await?;

            Ok::<_, AppError>(MovieDetail::from(envelope))
        }
        .instrument(make_span_with_request_id("GET", &path, &request_id))
        .await
    }

    async fn submit_satisfaction(&self, request: &SatisfactionRequest) -> AppResult<()> {
        let path = "/mypage/satisfaction";
        let request_id = RequestId::new();

        async {
            let response = self
                .request(Method::POST, path, &request_id)
                .json(request)
                .send()
                .await?;
            Self::check_status(response).await?;

            tracing::info!(
                session_id = %request.session_id,
                positive = request.is_positive,
                "Satisfaction submitted"
            );
            Ok::<_, AppError>(())
        }
        .instrument(make_span_with_request_id("POST", path, &request_id))
        .await
    }

    async fn log_playback_click(&self, movie_id: MovieId, provider_id: i64) -> AppResult<()> {
        let path = format!("/api/movies/{}/play", movie_id);
        let request_id = RequestId::new();

        async {
            let response = self
                .request(Method::POST, &path, &request_id)
                .json(&PlaybackClickRequest { provider_id })
                .send()
                .await?;
            Self::check_status(response).await?;
            Ok::<_, AppError>(())
        }
        .instrument(make_span_with_request_id("POST", &path, &request_id))
        .await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
