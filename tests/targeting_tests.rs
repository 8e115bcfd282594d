//! TargetSelectionEngine tests (paused tokio clock, hand-driven ticks)

#[cfg(test)]
mod tests {
    use helmsman::actuation::{ActuationCall, RecordingActuator};
    use helmsman::arbiter::Arbiter;
    use helmsman::control::{CombatGate, VisitedLog};
    use helmsman::store::{
        encode_name, BattleEntryRecord, BattleListRecord, CreatureRecord, CreaturesRecord,
        PathRecord, PositionRecord, RuleRecord, RulesRecord, StateStore, TargetRecord,
    };
    use helmsman::targeting::TargetingEngine;
    use helmsman::types::{
        AgentSettings, ArbiterConfig, PathStatus, RuleAction, Stance, TilePoint,
    };
    use std::sync::Arc;
    use std::time::Duration;

    struct Harness {
        engine: TargetingEngine,
        store: Arc<StateStore>,
        actuator: RecordingActuator,
        gate: Arc<CombatGate>,
        visited: Arc<VisitedLog>,
    }

    fn make_engine() -> Harness {
        let settings = AgentSettings::default();
        let store = StateStore::with_all_domains();
        let actuator = RecordingActuator::new();
        let (arbiter, handle) = Arbiter::new(
            ArbiterConfig {
                throttle_ms: 10,
                ..Default::default()
            },
            Box::new(actuator.clone()),
        );
        tokio::spawn(arbiter.run());
        let gate = Arc::new(CombatGate::new());
        let visited = Arc::new(VisitedLog::new());
        let engine = TargetingEngine::new(&settings, &store, handle, gate.clone(), visited.clone());
        Harness {
            engine,
            store,
            actuator,
            gate,
            visited,
        }
    }

    fn creature(id: u32, name: &str, distance_x100: i32, adjacent: bool) -> CreatureRecord {
        CreatureRecord {
            instance_id: id,
            tile: TilePoint::new(8, 5, 7),
            distance_x100,
            is_reachable: true,
            is_adjacent: adjacent,
            is_blocking_path: false,
            health_raw: 0,
            name: encode_name(name),
        }
    }

    fn attack_rule(name: &str, stickiness: u8, stance: Stance, distance: i32) -> RuleRecord {
        RuleRecord {
            name: encode_name(name),
            action_raw: RuleAction::Attack.as_raw(),
            priority: 1,
            stickiness,
            stance_raw: stance.as_raw(),
            distance,
        }
    }

    fn creatures_record(creatures: &[CreatureRecord]) -> CreaturesRecord {
        let mut record = CreaturesRecord::default();
        for c in creatures {
            record.push(*c);
        }
        record
    }

    fn rules_record(rules: &[RuleRecord]) -> RulesRecord {
        let mut record = RulesRecord::default();
        for r in rules {
            record.push(*r);
        }
        record
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn nearest_matching_creature_is_pursued() {
        let mut h = make_engine();
        let mut creatures = h.store.creatures.take_publisher().unwrap();
        let mut rules = h.store.rules.take_publisher().unwrap();
        rules.publish(rules_record(&[attack_rule("Cave Rat", 0, Stance::Stand, 1)]));
        creatures.publish(creatures_record(&[
            creature(10, "Cave Rat", 300, false),
            creature(11, "Cave Rat", 200, false),
        ]));

        h.engine.tick().await;

        assert_eq!(h.engine.pursued(), 11);
        assert!(h.gate.is_engaged());
    }

    #[tokio::test(start_paused = true)]
    async fn stickiness_holds_the_current_target() {
        let mut h = make_engine();
        let mut creatures = h.store.creatures.take_publisher().unwrap();
        let mut rules = h.store.rules.take_publisher().unwrap();
        // Stickiness 10 × step 0.075 → pursued score shrinks to a quarter.
        rules.publish(rules_record(&[attack_rule("Cave Rat", 10, Stance::Stand, 1)]));
        creatures.publish(creatures_record(&[creature(10, "Cave Rat", 300, false)]));
        h.engine.tick().await;
        assert_eq!(h.engine.pursued(), 10);

        // A closer rival appears, but not close enough to beat the bias.
        creatures.publish(creatures_record(&[
            creature(10, "Cave Rat", 300, false),
            creature(11, "Cave Rat", 200, false),
        ]));
        h.engine.tick().await;
        assert_eq!(h.engine.pursued(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn environment_selection_overrides_scoring() {
        let mut h = make_engine();
        let mut creatures = h.store.creatures.take_publisher().unwrap();
        let mut rules = h.store.rules.take_publisher().unwrap();
        let mut target = h.store.target.take_publisher().unwrap();
        rules.publish(rules_record(&[attack_rule("Cave Rat", 0, Stance::Stand, 1)]));
        creatures.publish(creatures_record(&[
            creature(10, "Cave Rat", 300, false),
            creature(11, "Cave Rat", 200, false),
        ]));
        // The environment already fights the farther rat.
        target.publish(TargetRecord {
            instance_id: 10,
            tile: TilePoint::new(8, 5, 7),
            distance_x100: 300,
            is_reachable: true,
            name: encode_name("Cave Rat"),
            update_counter: 1,
        });

        h.engine.tick().await;

        assert_eq!(h.engine.pursued(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_candidates_disengage_and_release_the_gate() {
        let mut h = make_engine();
        let mut creatures = h.store.creatures.take_publisher().unwrap();
        let mut rules = h.store.rules.take_publisher().unwrap();
        rules.publish(rules_record(&[attack_rule("Cave Rat", 0, Stance::Stand, 1)]));
        creatures.publish(creatures_record(&[creature(10, "Cave Rat", 200, false)]));
        h.engine.tick().await;
        assert!(h.gate.is_engaged());

        creatures.publish(creatures_record(&[]));
        h.engine.tick().await;

        assert_eq!(h.engine.pursued(), 0);
        assert!(!h.gate.is_engaged());
    }

    #[tokio::test(start_paused = true)]
    async fn ignore_rules_never_engage() {
        let mut h = make_engine();
        let mut creatures = h.store.creatures.take_publisher().unwrap();
        let mut rules = h.store.rules.take_publisher().unwrap();
        let mut ignore = attack_rule("Cave Rat", 0, Stance::Stand, 1);
        ignore.action_raw = RuleAction::Ignore.as_raw();
        rules.publish(rules_record(&[ignore]));
        creatures.publish(creatures_record(&[creature(10, "Cave Rat", 200, false)]));

        h.engine.tick().await;

        assert_eq!(h.engine.pursued(), 0);
        assert!(!h.gate.is_engaged());
    }

    // -----------------------------------------------------------------------
    // Acquisition
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn acquisition_clicks_the_battle_row_once_per_cooldown() {
        let mut h = make_engine();
        let mut creatures = h.store.creatures.take_publisher().unwrap();
        let mut rules = h.store.rules.take_publisher().unwrap();
        let mut battle = h.store.battle.take_publisher().unwrap();
        rules.publish(rules_record(&[attack_rule("Cave Rat", 0, Stance::Stand, 1)]));
        creatures.publish(creatures_record(&[creature(10, "Cave Rat", 200, false)]));
        let mut panel = BattleListRecord::default();
        panel.push(BattleEntryRecord {
            instance_id: 99,
            is_selected: false,
            name: encode_name("Spider"),
        });
        panel.push(BattleEntryRecord {
            instance_id: 10,
            is_selected: false,
            name: encode_name("Cave Rat"),
        });
        battle.publish(panel);

        // First tick clicks row 1; the environment never confirms, so the
        // poll runs out its budget.
        h.engine.tick().await;
        // Second tick wants to re-click but sits inside the cooldown.
        h.engine.tick().await;

        let clicks: Vec<_> = h
            .actuator
            .calls()
            .into_iter()
            .filter(|c| matches!(c, ActuationCall::LeftClick { .. }))
            .collect();
        assert_eq!(clicks.len(), 1);
        assert_eq!(clicks[0], ActuationCall::LeftClick { x: 1631, y: 253 });
    }

    // -----------------------------------------------------------------------
    // Movement
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn adjacent_melee_target_needs_no_movement() {
        let mut h = make_engine();
        let mut creatures = h.store.creatures.take_publisher().unwrap();
        let mut rules = h.store.rules.take_publisher().unwrap();
        let mut target = h.store.target.take_publisher().unwrap();
        rules.publish(rules_record(&[attack_rule("Cave Rat", 0, Stance::Reach, 1)]));
        creatures.publish(creatures_record(&[creature(10, "Cave Rat", 100, true)]));
        target.publish(TargetRecord {
            instance_id: 10,
            tile: TilePoint::new(6, 5, 7),
            distance_x100: 100,
            is_reachable: true,
            name: encode_name("Cave Rat"),
            update_counter: 1,
        });

        h.engine.tick().await;

        assert_eq!(h.engine.pursued(), 10);
        assert!(
            !h.actuator
                .calls()
                .iter()
                .any(|c| matches!(c, ActuationCall::SendKey { .. })),
            "no step keys while already adjacent"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_target_is_approached() {
        let mut h = make_engine();
        let mut creatures = h.store.creatures.take_publisher().unwrap();
        let mut rules = h.store.rules.take_publisher().unwrap();
        let mut target = h.store.target.take_publisher().unwrap();
        let mut positions = h.store.position.take_publisher().unwrap();
        let mut paths = h.store.path.take_publisher().unwrap();

        rules.publish(rules_record(&[attack_rule("Cave Rat", 0, Stance::Reach, 1)]));
        creatures.publish(creatures_record(&[creature(10, "Cave Rat", 300, false)]));
        target.publish(TargetRecord {
            instance_id: 10,
            tile: TilePoint::new(8, 5, 7),
            distance_x100: 300,
            is_reachable: true,
            name: encode_name("Cave Rat"),
            update_counter: 1,
        });
        positions.publish(PositionRecord {
            tile: TilePoint::new(5, 5, 7),
            update_counter: 1,
        });
        let mut path = PathRecord {
            start_anchor: TilePoint::new(5, 5, 7),
            ..Default::default()
        };
        path.set_status(PathStatus::PathFound);
        path.set_nodes(&[TilePoint::new(5, 5, 7), TilePoint::new(6, 5, 7)]);
        paths.publish(path);

        // The environment reacts to the step shortly after dispatch.
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            positions.publish(PositionRecord {
                tile: TilePoint::new(6, 5, 7),
                update_counter: 2,
            });
        });
        h.engine.tick().await;

        let keys = helmsman::types::KeyBindings::default();
        assert!(h.actuator.calls().contains(&ActuationCall::SendKey {
            key: keys.east,
            modifier: None,
        }));
        assert!(h.visited.any_within(&TilePoint::new(6, 5, 7), 0));
    }
}
