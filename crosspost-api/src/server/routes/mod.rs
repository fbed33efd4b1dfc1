use crate::server::ServerRouter;

mod accounts;
mod cover;
mod groups;
mod posts;
mod selection;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .merge(accounts::routes())
        .merge(groups::routes())
        .merge(selection::routes())
        .merge(cover::routes())
        .merge(posts::routes())
}

#[cfg(test)]
mod tests {
    use crate::server::{ServerState, routes};
    use async_trait::async_trait;
    use axum::{
        Router,
        body::{Body, Bytes},
        http::{Method, Request, StatusCode, header::CONTENT_TYPE},
    };
    use crosspost_composer::{
        cover::{
            CoverFrameExtractor, SamplingSettings,
            decoder::{
                DecodedVideo, EncodedImage, MediaDecodeError, MediaDecoder, StillImageDecoder,
                VideoInfo,
            },
        },
        session::ComposerSession,
        submit::{PostPayload, PostSubmitter, StubSubmitter, SubmissionReport},
    };
    use crosspost_store::{catalog::AccountCatalog, groups::GroupStore, kv::MemoryKeyValueStore};
    use http_body_util::BodyExt;
    use image::{ImageFormat, Rgb, RgbImage};
    use serde_json::{Value, json};
    use std::{io::Cursor, sync::Arc};
    use tokio::sync::Notify;
    use tower::ServiceExt;

    fn app() -> Router {
        app_with(
            Arc::new(StillImageDecoder),
            Arc::new(StubSubmitter::default().failing_for("4".parse().unwrap())),
        )
    }

    fn app_with(decoder: Arc<dyn MediaDecoder>, submitter: Arc<dyn PostSubmitter>) -> Router {
        let session = ComposerSession::new(
            AccountCatalog::demo(),
            GroupStore::load(Arc::new(MemoryKeyValueStore::new())),
            CoverFrameExtractor::new(decoder, SamplingSettings::default()),
        );

        routes().with_state(ServerState::new(session, submitter))
    }

    /// Treats any upload as a one second clip whose frames are all the same
    /// small picture.
    #[derive(Debug)]
    struct OneSecondClip;

    #[async_trait]
    impl DecodedVideo for OneSecondClip {
        fn info(&self) -> VideoInfo {
            VideoInfo {
                duration: time::Duration::SECOND,
                width: 3,
                height: 2,
            }
        }

        async fn frame_at(&self, _offset: time::Duration) -> Result<EncodedImage, MediaDecodeError> {
            EncodedImage::png_from_rgb(&RgbImage::from_pixel(3, 2, Rgb([200, 100, 0])))
        }
    }

    struct ClipDecoder;

    #[async_trait]
    impl MediaDecoder for ClipDecoder {
        async fn load_video(&self, _bytes: Bytes) -> Result<Arc<dyn DecodedVideo>, MediaDecodeError> {
            Ok(Arc::new(OneSecondClip))
        }

        fn load_image(&self, bytes: Bytes) -> Result<EncodedImage, MediaDecodeError> {
            StillImageDecoder.load_image(bytes)
        }
    }

    /// Holds every submission until the test releases it.
    #[derive(Default)]
    struct GatedSubmitter {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl PostSubmitter for GatedSubmitter {
        async fn submit(&self, payload: &PostPayload) -> SubmissionReport {
            self.entered.notify_one();
            self.release.notified().await;
            StubSubmitter::default().submit(payload).await
        }
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Body) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        (status, json)
    }

    async fn send_json(app: &Router, method: Method, uri: &str, body: &Value) -> (StatusCode, Value) {
        send(app, method, uri, Body::from(body.to_string())).await
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
        send(app, Method::GET, uri, Body::empty()).await
    }

    fn png() -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        RgbImage::from_pixel(3, 2, Rgb([10, 20, 30]))
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    fn ids(values: &Value) -> Vec<&str> {
        values
            .as_array()
            .unwrap()
            .iter()
            .map(|value| value.as_str().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn accounts_are_filtered_by_post_type() {
        let app = app();

        let (status, all) = get(&app, "/accounts").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(all.as_array().unwrap().len(), 5);

        let (_, text) = get(&app, "/accounts?post_type=text").await;
        let platforms: Vec<_> = text
            .as_array()
            .unwrap()
            .iter()
            .map(|account| account["platform"].as_str().unwrap())
            .collect();
        assert_eq!(platforms, ["facebook", "linkedin", "twitter", "threads"]);

        let (status, _) = get(&app, "/accounts?post_type=reel").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn selection_can_be_saved_and_matched() {
        let app = app();

        let (status, _) = send(&app, Method::POST, "/selection/toggle/1", Body::empty()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        send(&app, Method::PUT, "/selection/post-type/text", Body::empty()).await;
        send(&app, Method::POST, "/selection/toggle/2", Body::empty()).await;
        let (status, selection) =
            send(&app, Method::POST, "/selection/toggle/1", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&selection["selected"]), ["1", "2"]);
        assert!(selection["matchingGroup"].is_null());

        let (status, _) = send(&app, Method::POST, "/selection/toggle/5", Body::empty()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let (status, _) = send(&app, Method::POST, "/selection/toggle/99", Body::empty()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, created) =
            send_json(&app, Method::POST, "/groups/create", &json!({ "name": " Work " })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["group"]["name"], "Work");
        assert!(created["persistenceError"].is_null());
        let group_id = created["group"]["id"].as_u64().unwrap();

        let (_, selection) = get(&app, "/selection").await;
        assert_eq!(selection["matchingGroup"]["id"].as_u64(), Some(group_id));

        let (_, groups) = get(&app, "/groups").await;
        assert_eq!(groups.as_array().unwrap().len(), 1);

        let (_, deleted) =
            send(&app, Method::DELETE, &format!("/groups/{group_id}"), Body::empty()).await;
        assert_eq!(deleted["deleted"], true);
        let (_, deleted) =
            send(&app, Method::DELETE, &format!("/groups/{group_id}"), Body::empty()).await;
        assert_eq!(deleted["deleted"], false);
    }

    #[tokio::test]
    async fn group_creation_is_validated() {
        let app = app();

        let (status, body) = send_json(
            &app,
            Method::POST,
            "/groups/create",
            &json!({ "name": "   ", "accountIds": ["1", "2"] }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["status"], 422);

        let (status, _) = send_json(
            &app,
            Method::POST,
            "/groups/create",
            &json!({ "name": "Solo", "accountIds": ["1", "1"] }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (_, groups) = get(&app, "/groups").await;
        assert_eq!(groups, json!([]));
    }

    #[tokio::test]
    async fn group_selection_reports_dropped_members() {
        let app = app();
        let (_, created) = send_json(
            &app,
            Method::POST,
            "/groups/create",
            &json!({ "name": "Everyone", "accountIds": ["1", "5"] }),
        )
        .await;
        let group_id = created["group"]["id"].as_u64().unwrap();

        send(&app, Method::PUT, "/selection/post-type/text", Body::empty()).await;
        send(&app, Method::PUT, "/selection/view/groups", Body::empty()).await;

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/selection/group/{group_id}"),
            Body::empty(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&body["selection"]["selected"]), ["1"]);
        assert_eq!(ids(&body["dropped"]), ["5"]);

        let (status, _) = send(&app, Method::POST, "/selection/group/12345", Body::empty()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cover_errors_map_to_statuses() {
        let app = app();

        let (status, _) = send(&app, Method::POST, "/cover/frames", Body::empty()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(&app, Method::PUT, "/cover/video", Body::from(png())).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let (_, cancelled) = send(&app, Method::DELETE, "/cover/frames", Body::empty()).await;
        assert_eq!(cancelled["cancelled"], false);

        let (status, cover) = send(&app, Method::PUT, "/cover/custom", Body::from(png())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cover["kind"], "custom");
        assert_eq!(cover["image"]["mimeType"], "image/png");
        assert!(
            cover["image"]["dataUrl"]
                .as_str()
                .unwrap()
                .starts_with("data:image/png;base64,")
        );

        let (_, state) = get(&app, "/cover").await;
        assert_eq!(state["phase"], "noVideo");
        assert_eq!(state["active"]["kind"], "custom");
    }

    #[tokio::test]
    async fn posts_are_created_per_account() {
        let app = app();

        let (status, _) = send(&app, Method::POST, "/posts/create", Body::empty()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        send(&app, Method::PUT, "/selection/post-type/text", Body::empty()).await;
        send(&app, Method::POST, "/selection/toggle/4", Body::empty()).await;
        send(&app, Method::POST, "/selection/toggle/1", Body::empty()).await;
        let (status, draft) = send_json(
            &app,
            Method::PUT,
            "/draft",
            &json!({
                "content": "Big news",
                "useCustomCaptions": true,
                "customCaptions": { "1": "Big news, Facebook" }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(draft["isScheduled"], false);

        let (status, report) = send(&app, Method::POST, "/posts/create", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["created"][0]["accountId"], "1");
        assert_eq!(report["created"][0]["content"], "Big news, Facebook");
        assert_eq!(report["created"][0]["status"], "published");
        assert_eq!(report["failed"][0]["accountId"], "4");
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let (status, body) = get(&app(), "/nowhere").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], 404);
    }

    #[tokio::test]
    async fn groups_of_unknown_accounts_are_rejected() {
        let app = app();

        let (status, body) = send_json(
            &app,
            Method::POST,
            "/groups/create",
            &json!({ "name": "Ghosts", "accountIds": ["nope1", "nope2"] }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["message"], "Account nope1 is not connected");

        let (_, groups) = get(&app, "/groups").await;
        assert_eq!(groups, json!([]));
    }

    #[tokio::test]
    async fn session_stays_available_while_a_post_is_submitted() {
        let submitter = Arc::new(GatedSubmitter::default());
        let app = app_with(Arc::new(StillImageDecoder), submitter.clone());

        send(&app, Method::PUT, "/selection/post-type/text", Body::empty()).await;
        send(&app, Method::POST, "/selection/toggle/1", Body::empty()).await;
        send_json(&app, Method::PUT, "/draft", &json!({ "content": "Slow news" })).await;

        let in_flight = tokio::spawn({
            let app = app.clone();
            async move { send(&app, Method::POST, "/posts/create", Body::empty()).await }
        });
        submitter.entered.notified().await;

        let (status, draft) = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            get(&app, "/draft"),
        )
        .await
        .expect("the draft is readable during submission");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(draft["content"], "Slow news");

        submitter.release.notify_one();
        let (status, report) = in_flight.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["created"][0]["accountId"], "1");

        let (_, draft) = get(&app, "/draft").await;
        assert_eq!(draft["content"], "");
        let (_, selection) = get(&app, "/selection").await;
        assert_eq!(ids(&selection["selected"]), Vec::<&str>::new());
    }

    #[tokio::test]
    async fn sampled_frames_are_committed_and_selectable() {
        let app = app_with(Arc::new(ClipDecoder), Arc::new(StubSubmitter::default()));

        let (status, upload) =
            send(&app, Method::PUT, "/cover/video", Body::from("clip")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(upload["cover"]["phase"], "videoLoaded");
        assert_eq!(upload["cover"]["video"]["durationSeconds"], 1.0);

        let (status, frames) = send(&app, Method::POST, "/cover/frames", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        let offsets: Vec<_> = frames["frames"]
            .as_array()
            .unwrap()
            .iter()
            .map(|frame| frame["offsetSeconds"].as_f64().unwrap())
            .collect();
        assert_eq!(offsets, [0.0, 0.5, 1.0]);
        assert_eq!(frames["failures"], json!([]));

        let (_, state) = get(&app, "/cover").await;
        assert_eq!(state["phase"], "framesReady");
        assert_eq!(state["frames"]["frames"].as_array().unwrap().len(), 3);

        let (status, cover) = send(&app, Method::PUT, "/cover/frames/2", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cover["kind"], "videoFrame");
        assert_eq!(cover["offsetSeconds"], 1.0);
    }
}
