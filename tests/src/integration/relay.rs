//! # Relayed Calls
//!
//! Peer A -> hub -> peer B, correlated by the request id A generates.
//!
//! ```text
//! A.invoke_to ──forward-to-peer──▶ hub ──external:<op>──▶ B handler
//!      ▲                            │                         │
//!      └──────────── ack ◀──────────┴◀──────── reply-to ──────┘
//! ```

#[cfg(test)]
mod tests {
    use crate::integration::harness::{within, Harness};
    use futures::future::join_all;
    use ipc_bus::PeerTransport;
    use ipc_service::Request;
    use ipc_types::{
        from_payload, ConnectionId, IpcError, Payload, RelayEnvelope, ReplyEnvelope, RequestId,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_relay_round_trip_carries_request_id() {
        let harness = Harness::new();
        let main = harness.peer("main");
        let sub = harness.peer("sub");

        let (tx, mut seen) = mpsc::unbounded_channel();
        sub.handle("testSub", move |ctx, data| {
            let _ = tx.send(ctx.clone());
            async move { Ok(json!({ "echo": data })) }
        });

        let result = within(main.invoke_to("testSub", Request::new(json!([7])).lookup("sub")))
            .await
            .unwrap();
        assert_eq!(result, json!({ "echo": [7] }));

        let ctx = seen.recv().await.unwrap();
        let request_id = ctx.request_id().expect("relayed call carries an id");
        assert_eq!(RequestId::parse(request_id.as_str()).as_ref(), Some(request_id));
        assert_eq!(request_id.as_str().len(), 21);
        assert_eq!(ctx.caller_id(), main.id());
        assert_eq!(ctx.sender, ConnectionId::HUB);

        assert_eq!(harness.service.pending_count(), 0);
        assert_eq!(main.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_target_sees_the_id_the_caller_generated() {
        let harness = Harness::new();
        let (main, recorder) = harness.recorded_peer("main");
        let sub = harness.peer("sub");

        let (tx, mut seen) = mpsc::unbounded_channel();
        sub.handle("testSub", move |ctx, _| {
            let _ = tx.send(ctx.request_id().cloned());
            async { Ok(json!("ok")) }
        });

        let result = within(main.invoke_to("testSub", Request::new(json!([])).lookup("sub"))).await;
        assert_eq!(result, Ok(json!("ok")));

        let forwarded = recorder.invocations_on(&harness.namer().forward_to_peer());
        assert_eq!(forwarded.len(), 1);
        let envelope: RelayEnvelope = from_payload(forwarded[0].clone()).unwrap();

        let received = seen.recv().await.unwrap();
        assert_eq!(received, Some(envelope.request_id));
    }

    #[tokio::test]
    async fn test_sync_panicking_handler_replies_and_peer_survives() {
        let harness = Harness::new();
        let main = harness.peer("main");
        let sub = harness.peer("sub");
        sub.handle("fragile", |_, data: Payload| {
            if data == json!("panic") {
                panic!("rejected input");
            }
            async move { Ok(data) }
        });
        sub.handle("echo", |_, data| async move { Ok(data) });

        let error = within(main.invoke_to("fragile", Request::new(json!("panic")).lookup("sub")))
            .await
            .unwrap_err();
        assert_eq!(error, IpcError::handler("handler panicked"));

        let echoed = within(main.invoke_to("echo", Request::new(json!(5)).lookup("sub"))).await;
        assert_eq!(echoed, Ok(json!(5)));
        let again = within(main.invoke_to("fragile", Request::new(json!(6)).lookup("sub"))).await;
        assert_eq!(again, Ok(json!(6)));
    }

    #[tokio::test]
    async fn test_explicit_id_addressing() {
        let harness = Harness::new();
        let main = harness.peer("main");
        let sub = harness.peer("sub");
        sub.handle("whoami", |_, _| async { Ok(json!("sub")) });

        let result = within(main.invoke_to("whoami", Request::new(json!(null)).to(sub.id()))).await;
        assert_eq!(result, Ok(json!("sub")));
    }

    #[tokio::test]
    async fn test_missing_target_fails_before_forwarding() {
        let harness = Harness::new();
        let main = harness.peer("main");
        let sub = harness.peer("sub");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        sub.handle("testSub", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(json!(null)) }
        });

        let error = within(main.invoke_to("testSub", Request::new(json!([1]))))
            .await
            .unwrap_err();

        assert_eq!(error, IpcError::TargetUnresolved);
        assert_eq!(error.to_string(), "target peer id is required");
        assert_eq!(harness.hub.deliveries(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_name_is_unresolved_at_hub() {
        let harness = Harness::new();
        let main = harness.peer("main");

        let result = within(main.invoke_to("testSub", Request::new(json!(1)).lookup("nobody"))).await;

        assert_eq!(result, Err(IpcError::TargetUnresolved));
        assert_eq!(harness.hub.deliveries(), 0);
        assert_eq!(harness.service.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnected_target() {
        let harness = Harness::new();
        let main = harness.peer("main");

        let ghost = ConnectionId::new(99);
        let result = within(main.invoke_to("testSub", Request::new(json!(1)).to(ghost))).await;
        assert_eq!(result, Err(IpcError::ConnectionNotFound { id: ghost }));

        // A name that outlived its connection
        let sub = harness.peer("sub");
        harness.hub.disconnect(sub.id());
        let result = within(main.invoke_to("testSub", Request::new(json!(1)).lookup("sub"))).await;
        assert_eq!(result, Err(IpcError::ConnectionNotFound { id: sub.id() }));
    }

    #[tokio::test]
    async fn test_target_handler_error_reaches_caller() {
        let harness = Harness::new();
        let main = harness.peer("main");
        let sub = harness.peer("sub");
        sub.handle("save", |_, _| async { Err(IpcError::handler("read-only file system")) });

        let error = within(main.invoke_to("save", Request::new(json!(null)).lookup("sub")))
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "read-only file system");
        assert_eq!(harness.service.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_silent_target_times_out() {
        let harness = Harness::new();
        let main = harness.peer("main");
        let sub = harness.peer("sub");
        sub.receive("silent", |_, _| {});

        let error = within(main.invoke_to(
            "silent",
            Request::new(json!(null))
                .lookup("sub")
                .with_timeout(Duration::from_millis(40)),
        ))
        .await
        .unwrap_err();

        assert!(matches!(error, IpcError::RequestTimeout { .. }));
        assert_eq!(error.to_string(), "Request timeout");
        assert_eq!(harness.service.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_target_handler_times_out() {
        let harness = Harness::new();
        let main = harness.peer("main");
        let sub = harness.peer("sub");
        sub.handle("slow", |_, _| async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(json!("late"))
        });

        let error = within(main.invoke_to(
            "slow",
            Request::new(json!(null))
                .lookup("sub")
                .with_timeout(Duration::from_millis(40)),
        ))
        .await
        .unwrap_err();

        // Hub timer and handler budget are equal; either may fire first.
        assert!(error.is_timeout());
    }

    #[tokio::test]
    async fn test_late_reply_after_timeout_is_ignored() {
        let harness = Harness::new();
        let main = harness.peer("main");
        let sub = harness.raw_peer("sub");
        harness.answer_with(&sub, "late", Duration::from_millis(120), |message| {
            let meta = message.meta.expect("call metadata");
            vec![ReplyEnvelope::from_result(meta.request_id, Ok(json!("late")))]
        });

        let result = within(main.invoke_to(
            "late",
            Request::new(json!(null))
                .lookup("sub")
                .with_timeout(Duration::from_millis(30)),
        ))
        .await;
        assert!(matches!(result, Err(IpcError::RequestTimeout { .. })));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(harness.service.pending_count(), 0);
        assert_eq!(main.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_replies_settle_once() {
        let harness = Harness::new();
        let main = harness.peer("main");
        let sub = harness.raw_peer("sub");
        harness.answer_with(&sub, "twice", Duration::ZERO, |message| {
            let id = message.meta.expect("call metadata").request_id;
            vec![
                ReplyEnvelope::from_result(id.clone(), Ok(json!("first"))),
                ReplyEnvelope::from_result(id.clone(), Ok(json!("second"))),
                ReplyEnvelope::from_result(id, Err(IpcError::handler("third"))),
            ]
        });

        let result = within(main.invoke_to("twice", Request::new(json!(null)).lookup("sub"))).await;
        assert_eq!(result, Ok(json!("first")));
        assert_eq!(harness.service.stats().total_resolved.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_reply_for_unknown_id_is_ignored() {
        let harness = Harness::new();
        let stranger = harness.raw_peer("stranger");

        let reply = ReplyEnvelope::from_result(RequestId::new(), Ok(json!(1)));
        stranger
            .send(
                &harness.namer().reply_to(),
                ipc_types::to_payload(&reply).unwrap(),
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(harness.service.pending_count(), 0);
        assert_eq!(harness.service.stats().total_resolved.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_correlated() {
        let harness = Harness::new();
        let main = harness.peer("main");
        let sub = harness.peer("sub");
        sub.handle("square", |_, data| async move {
            let n = data.as_i64().unwrap_or_default();
            // Finish out of order
            tokio::time::sleep(Duration::from_millis(((20 - n) * 3) as u64)).await;
            Ok(json!(n * n))
        });

        let calls = (0..20).map(|n| main.invoke_to("square", Request::new(json!(n)).lookup("sub")));
        let results = within(join_all(calls)).await;

        for (n, result) in results.into_iter().enumerate() {
            assert_eq!(result, Ok(json!(n * n)));
        }
        assert_eq!(harness.service.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_send_to_delivers_notification() {
        let harness = Harness::new();
        let main = harness.peer("main");
        let sub = harness.peer("sub");
        let (tx, mut rx) = mpsc::unbounded_channel();
        sub.receive("notify", move |ctx, data| {
            let _ = tx.send((ctx.meta.is_none(), data));
        });

        main.send_to("notify", Request::new(json!("hi")).lookup("sub"))
            .await
            .unwrap();

        assert_eq!(within(rx.recv()).await, Some((true, json!("hi"))));
        assert_eq!(harness.service.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_send_to_unknown_target_is_silent() {
        let harness = Harness::new();
        let main = harness.peer("main");

        let sent = main
            .send_to("notify", Request::new(json!("hi")).lookup("nobody"))
            .await;
        assert_eq!(sent, Ok(()));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(harness.hub.deliveries(), 0);
    }

    #[tokio::test]
    async fn test_hub_originated_call() {
        let harness = Harness::new();
        let sub = harness.peer("sub");
        sub.handle("status", |ctx, _| async move {
            Ok(json!({ "caller": ctx.caller_id().get() }))
        });

        let result = within(
            harness
                .service
                .invoke_peer("status", Request::new(json!(null)).lookup("sub")),
        )
        .await;
        assert_eq!(result, Ok(json!({ "caller": 0 })));

        let result = within(
            harness
                .service
                .invoke_peer("status", Request::new(json!(null))),
        )
        .await;
        assert_eq!(result, Err(IpcError::TargetUnresolved));
    }
}
