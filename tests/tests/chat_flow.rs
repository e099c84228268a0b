mod utils;
#[allow(unused)]
use utils::*;

mod tests {
    use super::*;

    use mock_service::{MockConfig, StatusCode};
    use rampart::chat::{ChatOptions, Pacing, ScenarioPreset, Session};
    use rampart::step;
    use rampart::VuContext;
    use serde_json::json;

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn only_the_open_room_is_joined() {
        let mock = mock(MockConfig {
            token: "abc".into(),
            ..MockConfig::default()
        })
        .await;
        let scenario = scenario(&mock, fast_options());
        let collector = collector();

        for id in 1..=4 {
            let mut user = scenario.user(VuContext::new(id));
            let report = step::instrument(collector.clone(), scenario.run_iteration(&mut user)).await;
            assert_eq!(report.session.joined_room(), Some(1));
        }

        let joins = mock.requests_to("/join");
        assert_eq!(joins.len(), 4);
        assert!(joins
            .iter()
            .all(|r| r.path == "/api/v1/chats/rooms/group/1/join"));
        assert!(joins
            .iter()
            .all(|r| r.authorization.as_deref() == Some("Bearer abc")));
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn full_iteration() {
        let mock = mock(MockConfig::default()).await;
        let scenario = scenario(&mock, fast_options());
        let collector = collector();

        let mut user = scenario.user(VuContext::new(1));
        let report = step::instrument(collector.clone(), scenario.run_iteration(&mut user)).await;

        match &report.session {
            Session::MessagesFetched(fetched) => {
                assert_eq!(fetched.room_id, 1);
                assert_eq!(fetched.page.as_ref().map(|p| p.messages.len()), Some(1));
            }
            other => panic!("iteration stopped at {other:?}"),
        }
        assert_eq!(report.follow_ups, 1);
        assert_eq!(report.direct_room, Some(77));
        assert!(report.direct_messages_fetched);

        let login = &mock.requests_to("/auth/login")[0];
        assert_eq!(
            login.body,
            Some(json!({"email": "test1@test.com", "password": "test1234"}))
        );
        assert_eq!(login.authorization, None);

        let direct = &mock.requests_to("/rooms/direct")[0];
        assert_eq!(direct.body, Some(json!({"partnerId": 2})));

        let paths: Vec<_> = mock.recorded().into_iter().map(|r| r.path).collect();
        assert_eq!(
            paths,
            vec![
                "/api/v1/auth/login",
                "/api/v1/chats/rooms/group",
                "/api/v1/chats/rooms/group/public",
                "/api/v1/chats/rooms/group/1/join",
                "/api/v1/chats/rooms/1/messages",
                "/api/v1/chats/rooms/1/messages",
                "/api/v1/chats/rooms/direct",
                "/api/v1/chats/rooms/77/messages",
            ]
        );

        let snapshot = collector.snapshot();
        assert_eq!(rate(&snapshot, "http_req_failed"), Some(0.));
        assert_eq!(count(&snapshot, "http_req_duration"), 8.);
        assert_eq!(count(&snapshot, "http_req_duration{endpoint:getMessages}"), 3.);
        assert_eq!(count(&snapshot, "messages_received"), 3.);
        assert_eq!(count(&snapshot, "room_list_latency"), 1.);
        assert_eq!(rate(&snapshot, "checks{check:login has token}"), Some(1.));
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn stress_run_records_its_own_check_names() {
        let mock = mock(MockConfig::default()).await;
        let options = ChatOptions {
            pacing: Pacing::none(),
            ..ScenarioPreset::Stress.options()
        };
        let scenario = scenario(&mock, options);
        let collector = collector();

        let mut user = scenario.user(VuContext::new(1));
        step::instrument(collector.clone(), scenario.run_iteration(&mut user)).await;

        let snapshot = collector.snapshot();
        assert_eq!(rate(&snapshot, "checks{check:login successful}"), Some(1.));
        assert_eq!(rate(&snapshot, "checks{check:room list successful}"), Some(1.));
        assert_eq!(rate(&snapshot, "checks{check:public rooms retrieved}"), Some(1.));
        assert_eq!(rate(&snapshot, "checks{check:join group room success}"), Some(1.));
        assert_eq!(rate(&snapshot, "checks{check:messages retrieved}"), Some(1.));
        assert_eq!(rate(&snapshot, "checks{check:login status 200}"), None);
        assert_eq!(rate(&snapshot, "checks{check:login has token}"), None);
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn first_page_has_no_cursor() {
        let mock = mock(MockConfig::default()).await;
        let scenario = scenario(&mock, fast_options());

        let mut user = scenario.user(VuContext::new(1));
        step::instrument(collector(), scenario.run_iteration(&mut user)).await;

        let pages = mock.requests_to("/rooms/1/messages");
        let first = &pages[0];
        assert_eq!(first.query_param("size"), Some("25"));
        assert_eq!(first.query_param("chatRoomType"), Some("GROUP"));
        assert_eq!(first.query_param("cursor"), None);

        let direct = &mock.requests_to("/rooms/77/messages")[0];
        assert_eq!(direct.query_param("chatRoomType"), Some("DIRECT"));
        assert_eq!(direct.query_param("cursor"), None);
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn follows_exactly_one_page() {
        let mock = mock(MockConfig::default()).await;
        let scenario = scenario(&mock, fast_options());

        let mut user = scenario.user(VuContext::new(2));
        step::instrument(collector(), scenario.run_iteration(&mut user)).await;

        let cursors: Vec<_> = mock
            .requests_to("/rooms/1/messages")
            .iter()
            .map(|r| r.query_param("cursor").map(str::to_string))
            .collect();
        assert_eq!(cursors, vec![None, Some("c2".to_string())]);
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn no_follow_up_on_the_last_page() {
        let mock = mock(MockConfig {
            first_page: json!({"messages": [], "nextCursor": "c2", "hasMore": false}),
            ..MockConfig::default()
        })
        .await;
        let scenario = scenario(&mock, fast_options());

        let mut user = scenario.user(VuContext::new(1));
        let report = step::instrument(collector(), scenario.run_iteration(&mut user)).await;

        assert_eq!(report.follow_ups, 0);
        assert_eq!(mock.requests_to("/rooms/1/messages").len(), 1);
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn rejected_login_ends_the_iteration() {
        let mock = mock(MockConfig {
            login_status: StatusCode::UNAUTHORIZED,
            ..MockConfig::default()
        })
        .await;
        let scenario = scenario(&mock, fast_options());
        let collector = collector();

        let mut user = scenario.user(VuContext::new(3));
        let report = step::instrument(collector.clone(), scenario.run_iteration(&mut user)).await;

        assert!(!report.session.is_authenticated());
        assert_eq!(report.direct_room, None);
        assert_eq!(mock.recorded().len(), 1);

        let snapshot = collector.snapshot();
        assert_eq!(rate(&snapshot, "http_req_failed{endpoint:login}"), Some(1.));
        assert_eq!(rate(&snapshot, "checks{check:login status 200}"), Some(0.));
        assert_eq!(rate(&snapshot, "checks{check:login has token}"), Some(0.));
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn already_a_member_still_reads_messages() {
        let mock = mock(MockConfig {
            join_status: StatusCode::BAD_REQUEST,
            ..MockConfig::default()
        })
        .await;
        let scenario = scenario(&mock, fast_options());
        let collector = collector();

        let mut user = scenario.user(VuContext::new(1));
        let report = step::instrument(collector.clone(), scenario.run_iteration(&mut user)).await;

        assert_eq!(report.session.joined_room(), Some(1));
        assert_eq!(report.follow_ups, 1);

        let snapshot = collector.snapshot();
        assert_eq!(rate(&snapshot, "http_req_failed{endpoint:joinRoom}"), Some(0.));
        assert_eq!(
            rate(&snapshot, "checks{check:join group room status 200 or 400}"),
            Some(1.)
        );
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn failed_join_skips_messages() {
        let mock = mock(MockConfig {
            join_status: StatusCode::INTERNAL_SERVER_ERROR,
            ..MockConfig::default()
        })
        .await;
        let scenario = scenario(&mock, fast_options());

        let mut user = scenario.user(VuContext::new(1));
        let report = step::instrument(collector(), scenario.run_iteration(&mut user)).await;

        assert!(matches!(report.session, Session::RoomDiscovered(_)));
        assert!(mock.requests_to("/rooms/1/messages").is_empty());
        // The direct branch does not depend on the group room.
        assert_eq!(report.direct_room, Some(77));
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn locked_rooms_are_never_picked() {
        let mock = mock(MockConfig {
            public_rooms: vec![json!({"id": 2, "hasPassword": true})],
            ..MockConfig::default()
        })
        .await;
        let scenario = scenario(&mock, fast_options());

        let mut user = scenario.user(VuContext::new(1));
        let report = step::instrument(collector(), scenario.run_iteration(&mut user)).await;

        assert!(matches!(report.session, Session::Authenticated(_)));
        assert!(mock.requests_to("/join").is_empty());
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn missing_direct_room_skips_its_messages() {
        let mock = mock(MockConfig {
            direct_room_id: None,
            ..MockConfig::default()
        })
        .await;
        let scenario = scenario(&mock, fast_options());

        let mut user = scenario.user(VuContext::new(1));
        let report = step::instrument(collector(), scenario.run_iteration(&mut user)).await;

        assert_eq!(report.direct_room, None);
        assert!(!report.direct_messages_fetched);
        assert_eq!(mock.requests_to("/messages").len(), 2);
    }
}
