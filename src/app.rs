use std::net::SocketAddr;

use axum::{http::StatusCode, middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::{auth, gate, state::AppState};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .route("/health", get(|| async { "ok" })),
        )
        .fallback(|| async { StatusCode::NOT_FOUND })
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.routes.clone(),
            gate::session_gate,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let path = req.uri().path().to_owned();
                    tracing::info_span!("http_request", %method, %path, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, ?latency, "response");
                        } else {
                            tracing::info!(%status, ?latency, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use tower::ServiceExt;

    async fn json(res: Response) -> serde_json::Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// `name=value` from the first Set-Cookie header.
    fn cookie_pair(res: &Response) -> String {
        res.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn health() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn register_me_logout_me() {
        let app = build_app(AppState::fake());

        let res = app
            .clone()
            .oneshot(
                Request::post("/api/auth/register")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"name":"Jane Doe","email":"jane@example.com","password":"Secret123","confirmPassword":"Secret123"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let session = cookie_pair(&res);
        assert!(session.len() > "auth-token=".len());
        let registered = json(res).await;
        assert_eq!(registered["user"]["email"], "jane@example.com");

        let res = app
            .clone()
            .oneshot(
                Request::get("/api/auth/me")
                    .header(header::COOKIE, &session)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let me = json(res).await;
        assert_eq!(me["user"]["userId"], registered["user"]["id"]);
        assert_eq!(me["user"]["email"], "jane@example.com");
        assert_eq!(me["user"]["name"], "Jane Doe");
        let iat = me["user"]["iat"].as_i64().expect("iat is a unix timestamp");
        let exp = me["user"]["exp"].as_i64().expect("exp is a unix timestamp");
        assert_eq!(exp - iat, 7 * 24 * 60 * 60);

        let res = app
            .clone()
            .oneshot(
                Request::post("/api/auth/logout")
                    .header(header::COOKIE, &session)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let cleared = cookie_pair(&res);
        assert_eq!(cleared, "auth-token=");

        // the browser now sends the cleared cookie (or none at all)
        for cookie in [Some(cleared.as_str()), None] {
            let mut req = Request::get("/api/auth/me");
            if let Some(c) = cookie {
                req = req.header(header::COOKIE, c);
            }
            let res = app
                .clone()
                .oneshot(req.body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn login_sets_cookie_accepted_by_me() {
        let app = build_app(AppState::fake());
        app.clone()
            .oneshot(
                Request::post("/api/auth/register")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"name":"Jane Doe","email":"jane@example.com","password":"Secret123","confirmPassword":"Secret123"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        let res = app
            .clone()
            .oneshot(
                Request::post("/api/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"email":"jane@example.com","password":"Secret123"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let session = cookie_pair(&res);

        let res = app
            .oneshot(
                Request::get("/api/auth/me")
                    .header(header::COOKIE, &session)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn gate_wraps_the_whole_app() {
        let app = build_app(AppState::fake());

        let res = app
            .clone()
            .oneshot(Request::get("/profile").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            res.headers()[header::LOCATION],
            "/auth/login?callbackUrl=%2Fprofile"
        );

        let res = app
            .clone()
            .oneshot(Request::get("/api/users").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        // presence only: a bogus cookie gets through the gate to the 404 fallback
        let res = app
            .oneshot(
                Request::get("/profile")
                    .header(header::COOKIE, "auth-token=bogus")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
