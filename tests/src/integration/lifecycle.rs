//! # Lifecycle
//!
//! Shutdown of in-flight calls, once-listeners, unsubscription and channel
//! prefixes.

#[cfg(test)]
mod tests {
    use crate::integration::harness::{within, Harness};
    use futures::future::join_all;
    use ipc_service::{PeerService, Request, ServiceConfig};
    use ipc_types::IpcError;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn quick(request: Request) -> Request {
        request.with_timeout(Duration::from_millis(40))
    }

    #[tokio::test]
    async fn test_hub_destroy_rejects_every_relay() {
        let harness = Harness::new();
        let main = Arc::new(harness.peer("main"));
        let sub = harness.peer("sub");
        sub.receive("silent", |_, _| {});

        let calls: Vec<_> = (0..4)
            .map(|n| {
                let main = main.clone();
                tokio::spawn(async move {
                    main.invoke_to("silent", Request::new(json!(n)).lookup("sub"))
                        .await
                })
            })
            .collect();

        within(async {
            while harness.service.pending_count() < 4 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;

        assert_eq!(harness.service.destroy(), 4);
        assert_eq!(harness.service.pending_count(), 0);

        for call in within(join_all(calls)).await {
            assert!(matches!(
                call.unwrap(),
                Err(IpcError::RequestRejected { .. })
            ));
        }
        assert_eq!(main.pending_count(), 0);

        // Idempotent
        assert_eq!(harness.service.destroy(), 0);
    }

    #[tokio::test]
    async fn test_destroy_on_empty_tables() {
        let harness = Harness::new();
        let main = harness.peer("main");

        assert_eq!(main.destroy(), 0);
        assert_eq!(harness.service.destroy(), 0);
    }

    #[tokio::test]
    async fn test_service_usable_after_destroy() {
        let harness = Harness::new();
        harness
            .service
            .handle("ping", |_, _| async { Ok(json!(true)) });
        let main = harness.peer("main");
        let sub = harness.peer("sub");
        sub.handle("echo", |_, data| async move { Ok(data) });

        harness.service.destroy();
        main.destroy();

        assert_eq!(
            within(main.invoke("ping", Request::new(json!(null)))).await,
            Ok(json!(true))
        );
        assert_eq!(
            within(main.invoke_to("echo", Request::new(json!(5)).lookup("sub"))).await,
            Ok(json!(5))
        );
    }

    #[tokio::test]
    async fn test_handle_once_answers_only_first_call() {
        let harness = Harness::new();
        let main = harness.peer("main");
        let sub = harness.peer("sub");
        sub.handle_once("init", |_, _| async { Ok(json!("initialized")) });

        let first = within(main.invoke_to("init", quick(Request::new(json!(null)).lookup("sub")))).await;
        assert_eq!(first, Ok(json!("initialized")));

        let second = within(main.invoke_to("init", quick(Request::new(json!(null)).lookup("sub")))).await;
        assert!(matches!(second, Err(IpcError::RequestTimeout { .. })));
    }

    #[tokio::test]
    async fn test_receive_once_on_hub() {
        let harness = Harness::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        harness.service.receive_once("ready", move |ctx, _| {
            let _ = tx.send(ctx.sender);
        });
        let main = harness.peer("main");
        let sub = harness.peer("sub");

        main.send("ready", json!(null)).await.unwrap();
        assert_eq!(within(rx.recv()).await, Some(main.id()));

        sub.send("ready", json!(null)).await.unwrap();
        main.send("ready", json!(null)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribed_handler_stops_answering() {
        let harness = Harness::new();
        let main = harness.peer("main");
        let sub = harness.peer("sub");
        let handle = sub.handle("echo", |_, data| async move { Ok(data) });

        let before = within(main.invoke_to("echo", quick(Request::new(json!(1)).lookup("sub")))).await;
        assert_eq!(before, Ok(json!(1)));

        assert!(handle.unsubscribe());
        let after = within(main.invoke_to("echo", quick(Request::new(json!(2)).lookup("sub")))).await;
        assert!(matches!(after, Err(IpcError::RequestTimeout { .. })));
    }

    #[tokio::test]
    async fn test_unsubscribed_hub_handler() {
        let harness = Harness::new();
        let handle = harness
            .service
            .handle("ping", |_, _| async { Ok(json!(true)) });
        let main = harness.peer("main");

        assert!(handle.unsubscribe());
        let result = within(main.invoke("ping", Request::new(json!(null)))).await;
        assert!(matches!(result, Err(IpcError::Transport { .. })));
    }

    #[tokio::test]
    async fn test_custom_prefix_isolates_services() {
        let harness = Harness::with_config(ServiceConfig::default().with_channel_prefix("editor:"));
        harness
            .service
            .handle("ping", |_, _| async { Ok(json!("editor")) });

        let inside = harness.peer("inside");
        assert_eq!(
            within(inside.invoke("ping", Request::new(json!(null)))).await,
            Ok(json!("editor"))
        );

        // Same transport, default prefix: the hub's handler is not on its channel
        let outside = PeerService::new(Arc::new(harness.hub.connect()), ServiceConfig::default())
            .unwrap();
        let result = within(outside.invoke("ping", Request::new(json!(null)))).await;
        assert!(matches!(result, Err(IpcError::Transport { .. })));
    }

    #[tokio::test]
    async fn test_operation_named_like_control_channel() {
        let harness = Harness::new();
        harness
            .service
            .handle("forward-to-peer", |_, _| async { Ok(json!("user op")) });
        let main = harness.peer("main");
        let sub = harness.peer("sub");
        sub.handle("echo", |_, data| async move { Ok(data) });

        assert_eq!(
            within(main.invoke("forward-to-peer", Request::new(json!(null)))).await,
            Ok(json!("user op"))
        );
        // Relay still works
        assert_eq!(
            within(main.invoke_to("echo", Request::new(json!("x")).lookup("sub"))).await,
            Ok(json!("x"))
        );
    }
}
