//! ActionArbiter queue-discipline tests (paused tokio clock)

#[cfg(test)]
mod tests {
    use helmsman::actuation::{ActuationCall, RecordingActuator};
    use helmsman::arbiter::{await_completion, completion_channel, ActionCategory, Arbiter};
    use helmsman::types::ArbiterConfig;
    use std::time::Duration;
    use tokio::time::Instant;

    fn key(code: u32) -> ActuationCall {
        ActuationCall::SendKey {
            key: code,
            modifier: None,
        }
    }

    fn config(throttle_ms: u64, max_deferrals: u32) -> ArbiterConfig {
        ArbiterConfig {
            throttle_ms,
            max_deferrals,
            ..Default::default()
        }
    }

    // -----------------------------------------------------------------------
    // Priority ordering
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn urgent_request_dispatches_first() {
        let actuator = RecordingActuator::new();
        let (arbiter, handle) = Arbiter::new(config(10, 8), Box::new(actuator));
        let (tx, mut rx) = completion_channel();

        // Enqueued in reverse priority order, before the arbiter runs.
        let movement = handle
            .submit(ActionCategory::Movement, key(1), None, &tx)
            .unwrap();
        let urgent = handle
            .submit(ActionCategory::UserRule, key(2), None, &tx)
            .unwrap();
        tokio::spawn(arbiter.run());

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.id, urgent);
        assert_eq!(second.id, movement);
    }

    // -----------------------------------------------------------------------
    // Throttle
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn dispatches_respect_minimum_interval() {
        let actuator = RecordingActuator::new();
        let (arbiter, handle) = Arbiter::new(config(120, 8), Box::new(actuator));
        let (tx, mut rx) = completion_channel();
        tokio::spawn(arbiter.run());

        let started = Instant::now();
        for code in 0..3 {
            handle
                .submit(ActionCategory::Default, key(code), None, &tx)
                .unwrap();
        }
        for _ in 0..3 {
            rx.recv().await.unwrap();
        }
        // Two inter-dispatch gaps at minimum.
        assert!(started.elapsed() >= Duration::from_millis(240));
    }

    // -----------------------------------------------------------------------
    // TTL expiry
    // -----------------------------------------------------------------------

    /// A request whose TTL elapses while queued is dropped without dispatch
    /// and without a completion; the caller's own budget is the only guard.
    #[tokio::test(start_paused = true)]
    async fn expired_request_is_dropped_silently() {
        let actuator = RecordingActuator::new();
        let (arbiter, handle) = Arbiter::new(config(120, 8), Box::new(actuator.clone()));
        let (tx, mut rx) = completion_channel();
        tokio::spawn(arbiter.run());

        // First dispatch arms the throttle.
        let first = handle
            .submit(ActionCategory::Default, key(1), None, &tx)
            .unwrap();
        await_completion(&mut rx, first, Duration::from_secs(1))
            .await
            .unwrap();

        // TTL shorter than the throttle window it must sit out.
        let doomed = handle
            .submit(
                ActionCategory::Default,
                key(2),
                Some(Duration::from_millis(50)),
                &tx,
            )
            .unwrap();
        let outcome = await_completion(&mut rx, doomed, Duration::from_millis(500)).await;
        assert!(outcome.is_err(), "no completion for a TTL-dropped request");
        assert_eq!(actuator.calls().len(), 1, "only the first request ran");
    }

    // -----------------------------------------------------------------------
    // Anti-starvation
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn starved_request_is_promoted() {
        let actuator = RecordingActuator::new();
        let (arbiter, handle) = Arbiter::new(config(10, 2), Box::new(actuator));
        let (tx, mut rx) = completion_channel();

        let movement = handle
            .submit(ActionCategory::Movement, key(99), None, &tx)
            .unwrap();
        let mut targeting = Vec::new();
        for code in 0..6 {
            targeting.push(
                handle
                    .submit(ActionCategory::Targeting, key(code), None, &tx)
                    .unwrap(),
            );
        }
        tokio::spawn(arbiter.run());

        let mut order = Vec::new();
        for _ in 0..7 {
            order.push(rx.recv().await.unwrap().id);
        }
        let movement_at = order.iter().position(|id| *id == movement).unwrap();
        // Loses max_deferrals cycles, then overtakes the remaining targeting
        // requests instead of waiting out all six.
        assert_eq!(movement_at, 2);
    }

    // -----------------------------------------------------------------------
    // Completion contract
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn failed_dispatch_still_completes() {
        let actuator = RecordingActuator::new();
        actuator.set_fail_all(true);
        let (arbiter, handle) = Arbiter::new(config(10, 8), Box::new(actuator));
        let (tx, mut rx) = completion_channel();
        tokio::spawn(arbiter.run());

        let id = handle
            .submit(ActionCategory::Default, key(1), None, &tx)
            .unwrap();
        let completion = await_completion(&mut rx, id, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!completion.success);
        assert!(completion.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn await_completion_discards_stale_ids() {
        let (tx, mut rx) = completion_channel();
        tx.send(helmsman::arbiter::Completion {
            id: 1,
            success: true,
            error: None,
        })
        .unwrap();
        tx.send(helmsman::arbiter::Completion {
            id: 2,
            success: true,
            error: None,
        })
        .unwrap();

        let completion = await_completion(&mut rx, 2, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(completion.id, 2);
    }

    // -----------------------------------------------------------------------
    // Pointer settling
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn mouse_dispatch_settles_the_pointer() {
        let actuator = RecordingActuator::new();
        let mut cfg = config(10, 8);
        cfg.settle_rect = (1000, 500, 100, 50);
        let (arbiter, handle) = Arbiter::new(cfg, Box::new(actuator.clone()));
        let (tx, mut rx) = completion_channel();
        tokio::spawn(arbiter.run());

        let id = handle
            .submit(
                ActionCategory::Targeting,
                ActuationCall::LeftClick { x: 10, y: 20 },
                None,
                &tx,
            )
            .unwrap();
        await_completion(&mut rx, id, Duration::from_secs(1))
            .await
            .unwrap();

        let calls = actuator.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], ActuationCall::LeftClick { x: 10, y: 20 });
        match calls[1] {
            ActuationCall::MouseMove { x, y } => {
                assert!((1000..1100).contains(&x));
                assert!((500..550).contains(&y));
            }
            ref other => panic!("expected settle move, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn key_dispatch_does_not_settle() {
        let actuator = RecordingActuator::new();
        let (arbiter, handle) = Arbiter::new(config(10, 8), Box::new(actuator.clone()));
        let (tx, mut rx) = completion_channel();
        tokio::spawn(arbiter.run());

        let id = handle
            .submit(ActionCategory::Movement, key(7), None, &tx)
            .unwrap();
        await_completion(&mut rx, id, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(actuator.calls(), vec![key(7)]);
    }
}
