#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::admin::media::{sanitize_file_name, storage_key};
    use crate::create_app;
    use crate::storage::StorageError;
    use crate::store::memory::TestStore;
    use crate::store::{AdminAuth, MediaCatalog, Store, StoreError};
    use crate::types::{MediaItem, MediaType, NewMedia};

    use axum::{
        body::Body,
        http::{self, Method, Request, StatusCode},
        response::Response,
    };
    use base64::{engine::general_purpose::STANDARD, Engine};
    use tower::ServiceExt;
    use uuid::Uuid;

    const BOUNDARY: &str = "X-MEDIA-BOUNDARY";

    fn hashed(password: &str) -> String {
        STANDARD.encode(bcrypt::hash(password, 4).unwrap())
    }

    fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method(method)
            .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn with_session(harness: &TestStore, method: Method, uri: &str, body: Body) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method(method)
            .header(http::header::COOKIE, format!("admin_token={}", harness.admin_token()))
            .body(body)
            .unwrap()
    }

    fn multipart(files: &[(&str, &[u8])]) -> Body {
        let mut body = Vec::new();
        for (name, data) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Body::from(body)
    }

    fn upload_request(harness: &TestStore, files: &[(&str, &[u8])]) -> Request<Body> {
        let mut request = with_session(
            harness,
            Method::POST,
            "/admin/media/upload",
            multipart(files),
        );
        request.headers_mut().insert(
            http::header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}").parse().unwrap(),
        );
        request
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn storage_keys_are_sanitized_and_unique() {
        assert_eq!(sanitize_file_name("my holiday (1).MP4"), "my_holiday__1_.MP4");
        assert_eq!(sanitize_file_name("café.png"), "caf_.png");

        let first = storage_key("a b.png");
        let second = storage_key("a b.png");
        assert_ne!(first, second);
        assert!(first.ends_with("-a_b.png"));
        assert_eq!(first.len(), 36 + 1 + "a_b.png".len());
    }

    #[tokio::test]
    async fn login_sets_session_cookie() {
        let harness = TestStore::with_password_hash(Some(hashed("hunter2")));
        let app = create_app(harness.store.clone());

        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/admin/login",
                serde_json::json!({ "password": "hunter2" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()[http::header::SET_COOKIE]
            .to_str()
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("admin_token="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Max-Age=28800"));
        assert!(!cookie.contains("Secure"));

        let session = cookie.split(';').next().unwrap().to_string();
        let me = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/admin/me")
                    .header(http::header::COOKIE, session)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(me.status(), StatusCode::OK);
        assert_eq!(json_body(me).await["authorized"], true);

        let anonymous = app
            .oneshot(Request::builder().uri("/admin/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_failures() {
        let harness = TestStore::with_password_hash(Some(hashed("hunter2")));
        let app = create_app(harness.store.clone());

        let wrong = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/admin/login",
                serde_json::json!({ "password": "hunter3" }),
            ))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert!(wrong.headers().get(http::header::SET_COOKIE).is_none());

        let empty = app
            .oneshot(json_request(Method::POST, "/admin/login", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

        let unconfigured = create_app(TestStore::new().store)
            .oneshot(json_request(
                Method::POST,
                "/admin/login",
                serde_json::json!({ "password": "hunter2" }),
            ))
            .await
            .unwrap();
        assert_eq!(unconfigured.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let plain = TestStore::with_password_hash(Some(STANDARD.encode("plain")));
        let not_bcrypt = create_app(plain.store)
            .oneshot(json_request(
                Method::POST,
                "/admin/login",
                serde_json::json!({ "password": "plain" }),
            ))
            .await
            .unwrap();
        assert_eq!(not_bcrypt.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn logout_clears_cookie() {
        let harness = TestStore::new();
        let response = create_app(harness.store.clone())
            .oneshot(with_session(&harness, Method::POST, "/admin/logout", Body::empty()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()[http::header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("admin_token=;"));
        assert!(cookie.contains("Max-Age=0"));
        assert_eq!(
            response.headers()["clear-site-data"],
            "\"cookies\", \"storage\""
        );
    }

    #[tokio::test]
    async fn access_tokens_are_not_admin_sessions() {
        let harness = TestStore::new();
        let coupon = harness.coupon(crate::types::CouponType::All, None, false);
        let response = create_app(harness.store.clone())
            .oneshot(
                Request::builder()
                    .uri("/admin/media")
                    .header(
                        http::header::AUTHORIZATION,
                        format!("Bearer {}", harness.access_token(coupon.id)),
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn upload_reports_each_file() {
        let harness = TestStore::new();
        let app = create_app(harness.store.clone());

        let response = app
            .clone()
            .oneshot(upload_request(
                &harness,
                &[
                    ("Summer Trip.mp4", &b"movie"[..]),
                    ("notes.txt", &b"text"[..]),
                    ("cover.png", &b"png"[..]),
                    ("empty.mp3", &b""[..]),
                ],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["uploaded"], 2);
        assert_eq!(body["failed"], 2);

        let results = body["results"].as_array().unwrap();
        assert_eq!(results[0]["success"], true);
        assert_eq!(results[0]["fileType"], "video");
        assert_eq!(results[0]["attemptsUsed"], 1);
        let key = results[0]["fileName"].as_str().unwrap();
        assert!(key.ends_with("-Summer_Trip.mp4"));
        assert!(harness.storage.contains(key));
        assert_eq!(results[1]["error"], "File type not allowed");
        assert_eq!(results[2]["fileType"], "image");
        assert_eq!(results[3]["error"], "Invalid file size");

        let listing = app
            .oneshot(with_session(&harness, Method::GET, "/admin/media", Body::empty()))
            .await
            .unwrap();
        let body = json_body(listing).await;
        let media = body["media"].as_array().unwrap();
        assert_eq!(media.len(), 2);
        assert!(media
            .iter()
            .any(|item| item["displayName"] == "Summer Trip.mp4" && item["fileName"] == key));
    }

    #[tokio::test]
    async fn upload_retries_transient_failures() {
        let harness = TestStore::new();
        harness.storage.fail_next_uploads(vec![
            StorageError::Status {
                status: 503,
                message: "service_unavailable".to_string(),
            },
            StorageError::Status {
                status: 500,
                message: "internal_error".to_string(),
            },
        ]);

        let response = create_app(harness.store.clone())
            .oneshot(upload_request(&harness, &[("song.flac", &b"flac"[..])]))
            .await
            .unwrap();

        let body = json_body(response).await;
        assert_eq!(body["uploaded"], 1);
        assert_eq!(body["results"][0]["attemptsUsed"], 3);
        assert_eq!(harness.storage.upload_attempts(), 3);
        assert_eq!(harness.media.ids().len(), 1);
    }

    #[tokio::test]
    async fn upload_gives_up_on_rejection() {
        let harness = TestStore::new();
        harness.storage.fail_next_uploads(vec![StorageError::Status {
            status: 400,
            message: "bad_request".to_string(),
        }]);

        let response = create_app(harness.store.clone())
            .oneshot(upload_request(&harness, &[("song.flac", &b"flac"[..])]))
            .await
            .unwrap();

        let body = json_body(response).await;
        assert_eq!(body["uploaded"], 0);
        assert_eq!(body["failed"], 1);
        assert_eq!(harness.storage.upload_attempts(), 1);
        assert!(harness.media.ids().is_empty());
    }

    #[tokio::test]
    async fn upload_without_files_is_rejected() {
        let harness = TestStore::new();
        let response = create_app(harness.store.clone())
            .oneshot(upload_request(&harness, &[]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn batch_delete_keeps_rows_whose_blobs_survive() {
        let harness = TestStore::new();
        let first = harness.media("one.png", MediaType::Image, b"1").await;
        let second = harness.media("two.png", MediaType::Image, b"2").await;
        let third = harness.media("three.png", MediaType::Image, b"3").await;
        harness.storage.fail_delete_of("two.png");

        let uri = format!("/admin/media?ids={},{},{}", first.id, second.id, third.id);
        let response = create_app(harness.store.clone())
            .oneshot(with_session(&harness, Method::DELETE, &uri, Body::empty()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Deleted 2 file(s)");
        assert_eq!(body["details"]["successful"].as_array().unwrap().len(), 2);
        let failed = body["details"]["failed"].as_array().unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0]["id"], second.id.to_string());

        assert_eq!(harness.media.ids(), vec![second.id]);
        assert!(harness.storage.contains("two.png"));
        assert!(!harness.storage.contains("one.png"));
    }

    #[tokio::test]
    async fn delete_validates_ids() {
        let harness = TestStore::new();
        let app = create_app(harness.store.clone());

        let none = app
            .clone()
            .oneshot(with_session(&harness, Method::DELETE, "/admin/media", Body::empty()))
            .await
            .unwrap();
        assert_eq!(none.status(), StatusCode::BAD_REQUEST);

        let unknown = app
            .oneshot(with_session(
                &harness,
                Method::DELETE,
                &format!("/admin/media?id={}", uuid::Uuid::new_v4()),
                Body::empty(),
            ))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_download_always_proxies() {
        let harness = TestStore::new();
        let movie = harness.media("movie.mp4", MediaType::Video, b"mp4").await;

        let response = create_app(harness.store.clone())
            .oneshot(with_session(
                &harness,
                Method::GET,
                &format!("/admin/media/download?id={}", movie.id),
                Body::empty(),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[http::header::CONTENT_DISPOSITION],
            "attachment; filename=\"original%20movie.mp4\""
        );
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&bytes[..], b"mp4");
    }

    #[tokio::test]
    async fn signed_url_defaults_to_one_hour() {
        let harness = TestStore::new();
        let app = create_app(harness.store.clone());

        let mut request = with_session(
            &harness,
            Method::POST,
            "/admin/media/signed-url",
            Body::from(serde_json::json!({ "fileName": "clip.mp4" }).to_string()),
        );
        request.headers_mut().insert(
            http::header::CONTENT_TYPE,
            mime::APPLICATION_JSON.as_ref().parse().unwrap(),
        );
        let response = app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert!(body["signedUrl"]
            .as_str()
            .unwrap()
            .ends_with("/clip.mp4?Authorization=download-token"));
        assert_eq!(harness.storage.signed_ttls()[0].1.as_secs(), 3600);

        let mut missing = with_session(
            &harness,
            Method::POST,
            "/admin/media/signed-url",
            Body::from("{}"),
        );
        missing.headers_mut().insert(
            http::header::CONTENT_TYPE,
            mime::APPLICATION_JSON.as_ref().parse().unwrap(),
        );
        let response = app.oneshot(missing).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    struct BrokenCatalog;

    #[async_trait::async_trait]
    impl MediaCatalog for BrokenCatalog {
        async fn insert(&self, _media: &NewMedia) -> Result<MediaItem, StoreError> {
            Err(StoreError::Corrupt("reel".parse::<MediaType>().unwrap_err()))
        }

        async fn find(&self, _id: Uuid) -> Result<Option<MediaItem>, StoreError> {
            Ok(None)
        }

        async fn find_many(&self, _ids: &[Uuid]) -> Result<Vec<MediaItem>, StoreError> {
            Ok(Vec::new())
        }

        async fn list(&self, _scope: Option<MediaType>) -> Result<Vec<MediaItem>, StoreError> {
            Ok(Vec::new())
        }

        async fn delete_many(&self, _ids: &[Uuid]) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn blob_is_removed_when_catalog_insert_fails() {
        let harness = TestStore::new();
        let store = Arc::new(Store {
            coupons: harness.coupons.clone(),
            media: Arc::new(BrokenCatalog),
            storage: harness.storage.clone(),
            access_keys: harness.store.access_keys.clone(),
            admin: AdminAuth {
                keys: harness.store.admin.keys.clone(),
                password_hash: None,
                cookie_secure: false,
            },
            upload_retry: harness.store.upload_retry,
        });

        let response = create_app(store)
            .oneshot(upload_request(&harness, &[("cover.png", &b"png"[..])]))
            .await
            .unwrap();

        let body = json_body(response).await;
        assert_eq!(body["failed"], 1);
        assert_eq!(body["results"][0]["error"], "Failed to record upload");
        let deleted = harness.storage.deleted();
        assert_eq!(deleted.len(), 1);
        assert!(deleted[0].ends_with("-cover.png"));
        assert!(!harness.storage.contains(&deleted[0]));
    }
}
