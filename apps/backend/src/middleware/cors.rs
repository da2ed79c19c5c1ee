use actix_cors::Cors;
use actix_web::http::header;

/// Build CORS middleware from `CORS_ORIGINS` / `CORS_ALLOW_CREDENTIALS`.
///
/// Entries that are not `http(s)://` origins are ignored; `*` allows any
/// origin. An empty effective list falls back to the local frontend.
pub fn cors_middleware(origins: &[String], allow_credentials: bool) -> Cors {
    let allow_any = origins.iter().any(|o| o.trim() == "*");
    let allowed_origins = valid_origins(origins);

    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ])
        .max_age(3600);

    if allow_credentials {
        cors = cors.supports_credentials();
    }

    if allow_any {
        return cors.allow_any_origin();
    }

    let effective = if allowed_origins.is_empty() {
        vec!["http://localhost:3000".to_string()]
    } else {
        allowed_origins
    };
    for origin in effective {
        cors = cors.allowed_origin(&origin);
    }
    cors
}

fn valid_origins(origins: &[String]) -> Vec<String> {
    origins
        .iter()
        .map(|s| s.trim().trim_end_matches('/'))
        .filter(|s| !s.is_empty() && *s != "null")
        .filter(|s| s.starts_with("http://") || s.starts_with("https://"))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use actix_web::http::{Method, StatusCode};
    use actix_web::test as actix_test;
    use actix_web::{web, App, HttpResponse};

    use super::*;

    #[test]
    fn test_invalid_origins_are_dropped() {
        let origins = vec![
            "https://scribe.example.com/".to_string(),
            "null".to_string(),
            "ftp://files.example.com".to_string(),
            " http://localhost:3000 ".to_string(),
        ];
        assert_eq!(
            valid_origins(&origins),
            vec!["https://scribe.example.com", "http://localhost:3000"]
        );
    }

    #[actix_web::test]
    async fn test_configured_origin_is_allowed() {
        let app = actix_test::init_service(
            App::new()
                .wrap(cors_middleware(
                    &["https://scribe.example.com".to_string()],
                    true,
                ))
                .route("/ping", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let req = actix_test::TestRequest::default()
            .method(Method::OPTIONS)
            .uri("/ping")
            .insert_header((header::ORIGIN, "https://scribe.example.com"))
            .insert_header((header::ACCESS_CONTROL_REQUEST_METHOD, "GET"))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "https://scribe.example.com"
        );
        assert_eq!(
            resp.headers()
                .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
                .unwrap(),
            "true"
        );
    }
}
