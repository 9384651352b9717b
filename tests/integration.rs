//! End-to-end workflows: module composition, namespacing, dispatch, dynamic
//! registration, hot update, watchers, and the event stream.

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use treestate::{
    Action, CallOptions, ModuleConfig, RegisterOptions, Store, StoreEvent,
};

/// Root counter plus a namespaced `cart` module.
fn app_store() -> Store {
    Store::new(
        ModuleConfig::new()
            .state(json!({"count": 0}))
            .mutation("increment", |state, _| {
                state["count"] = json!(state["count"].as_i64().unwrap() + 1);
                Ok(())
            })
            .getter("double", |g| {
                json!(g.state()["count"].as_i64().unwrap() * 2)
            })
            .module(
                "cart",
                ModuleConfig::new()
                    .namespaced(true)
                    .state(json!({"items": []}))
                    .mutation("push", |state, payload| {
                        let item = payload.cloned().unwrap_or(Value::Null);
                        state["items"].as_array_mut().unwrap().push(item);
                        Ok(())
                    })
                    .getter("size", |g| json!(g.state()["items"].as_array().unwrap().len()))
                    .action("add_item", |ctx, payload| async move {
                        ctx.commit(("push", payload.unwrap_or(Value::Null)))?;
                        Ok(json!(ctx.getter("size").unwrap()))
                    }),
            ),
    )
    .unwrap()
}

#[test]
fn test_module_state_is_grafted_under_its_key() {
    let store = app_store();
    assert_eq!(
        store.state(),
        json!({"count": 0, "cart": {"items": []}})
    );
    assert_eq!(store.state_at(&["cart"]), json!({"items": []}));
}

#[test]
fn test_namespaced_keys_are_prefixed() {
    let store = app_store();
    assert!(store.has_getter("double"));
    assert!(store.has_getter("cart/size"));
    assert!(store.has_mutation("cart/push"));
    assert!(store.has_action("cart/add_item"));
    assert!(!store.has_getter("size"));
    assert_eq!(store.namespace_path("cart/"), Some(vec!["cart".to_string()]));
}

#[test]
fn test_namespaced_mutation_targets_local_slice() {
    let store = app_store();
    store.commit(("cart/push", json!("apple"))).unwrap();
    assert_eq!(store.state_at(&["cart"])["items"], json!(["apple"]));
    assert_eq!(store.state()["count"], json!(0));
}

#[tokio::test]
async fn test_action_commits_through_local_context() {
    let store = app_store();
    let result = store.dispatch(("cart/add_item", json!("pear"))).await.unwrap();

    // The action returns the post-commit cart size.
    assert_eq!(result, Some(json!(1)));
    assert_eq!(store.state_at(&["cart"])["items"], json!(["pear"]));
    assert_eq!(store.getter("cart/size"), Some(json!(1)));
}

#[tokio::test]
async fn test_action_returns_plain_value() {
    let store = Store::new(
        ModuleConfig::new()
            .state(json!({}))
            .action("answer", |_, _| async { Ok(json!(5)) }),
    )
    .unwrap();
    assert_eq!(store.dispatch("answer").await.unwrap(), Some(json!(5)));
}

#[tokio::test]
async fn test_shared_action_type_collects_results_in_order() {
    let store = Store::new(
        ModuleConfig::new()
            .state(json!({}))
            .module(
                "x",
                ModuleConfig::new()
                    .state(json!({}))
                    .action("ping", |_, _| async { Ok(json!("x")) }),
            )
            .module(
                "y",
                ModuleConfig::new()
                    .state(json!({}))
                    .action("ping", |_, _| async { Ok(json!("y")) }),
            ),
    )
    .unwrap();

    // Neither module is namespaced, so both handlers share the key.
    assert_eq!(
        store.dispatch("ping").await.unwrap(),
        Some(json!(["x", "y"]))
    );
}

#[test]
fn test_shared_mutation_type_runs_all_handlers_in_order() {
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let root_order = Arc::clone(&order);
    let child_order = Arc::clone(&order);

    let store = Store::new(
        ModuleConfig::new()
            .state(json!({"hits": 0}))
            .mutation("bump", move |state, _| {
                root_order.lock().unwrap().push("root");
                state["hits"] = json!(state["hits"].as_i64().unwrap() + 1);
                Ok(())
            })
            .module(
                "x",
                ModuleConfig::new()
                    .state(json!({"hits": 0}))
                    .mutation("bump", move |state, _| {
                        child_order.lock().unwrap().push("x");
                        state["hits"] = json!(state["hits"].as_i64().unwrap() + 1);
                        Ok(())
                    }),
            ),
    )
    .unwrap();

    store.commit("bump").unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["root", "x"]);
    assert_eq!(store.state()["hits"], json!(1));
    assert_eq!(store.state_at(&["x"])["hits"], json!(1));
}

#[tokio::test]
async fn test_root_action_escapes_namespace() {
    let store = Store::new(ModuleConfig::new().state(json!({})).module(
        "auth",
        ModuleConfig::new()
            .namespaced(true)
            .state(json!({}))
            .action_decl("refresh", Action::root(|_, _| async { Ok(json!("ok")) })),
    ))
    .unwrap();

    assert!(store.has_action("refresh"));
    assert!(!store.has_action("auth/refresh"));
    assert_eq!(store.dispatch("refresh").await.unwrap(), Some(json!("ok")));
}

#[tokio::test]
async fn test_local_context_root_escape() {
    let store = Store::new(
        ModuleConfig::new()
            .state(json!({"count": 0}))
            .mutation("increment", |state, _| {
                state["count"] = json!(state["count"].as_i64().unwrap() + 1);
                Ok(())
            })
            .module(
                "worker",
                ModuleConfig::new()
                    .namespaced(true)
                    .state(json!({}))
                    .action("poke_root", |ctx, _| async move {
                        ctx.commit_with("increment", CallOptions::root())?;
                        Ok(Value::Null)
                    }),
            ),
    )
    .unwrap();

    store.dispatch("worker/poke_root").await.unwrap();
    assert_eq!(store.state()["count"], json!(1));
}

#[tokio::test]
async fn test_unknown_local_type_is_noop() {
    let store = Store::new(ModuleConfig::new().state(json!({})).module(
        "m",
        ModuleConfig::new()
            .namespaced(true)
            .state(json!({}))
            .action("try_missing", |ctx, _| async move {
                // Resolves to "m/nothing", which nothing registered.
                let result = ctx.dispatch("nothing").await?;
                assert!(result.is_none());
                ctx.commit("nothing")?;
                Ok(Value::Null)
            }),
    ))
    .unwrap();

    store.dispatch("m/try_missing").await.unwrap();
}

#[test]
fn test_duplicate_getter_key_keeps_first_registration() {
    // "m" is not namespaced, so its "label" getter lands on the same global
    // key as the root's; the earlier registration wins and the duplicate is
    // discarded.
    let store = Store::new(
        ModuleConfig::new()
            .state(json!({}))
            .getter("label", |_| json!("root"))
            .module(
                "m",
                ModuleConfig::new()
                    .state(json!({}))
                    .getter("label", |_| json!("child")),
            ),
    )
    .unwrap();

    assert_eq!(store.getter("label"), Some(json!("root")));
    assert_eq!(store.getter_keys(), vec!["label".to_string()]);
}

#[test]
fn test_namespace_map_collision_is_last_write_wins() {
    // "a" and "outer.a" both resolve to namespace "a/" ("outer" contributes
    // no prefix); the later installation owns the map entry.
    let store = Store::new(
        ModuleConfig::new()
            .state(json!({}))
            .module(
                "a",
                ModuleConfig::new().namespaced(true).state(json!({"from": "top"})),
            )
            .module(
                "outer",
                ModuleConfig::new().state(json!({})).module(
                    "a",
                    ModuleConfig::new()
                        .namespaced(true)
                        .state(json!({"from": "nested"})),
                ),
            ),
    )
    .unwrap();

    assert_eq!(
        store.namespace_path("a/"),
        Some(vec!["outer".to_string(), "a".to_string()])
    );
}

#[test]
fn test_getter_reads_sibling_getter() {
    let store = Store::new(
        ModuleConfig::new()
            .state(json!({"count": 3}))
            .getter("double", |g| {
                json!(g.state()["count"].as_i64().unwrap() * 2)
            })
            .getter("quadruple", |g| {
                json!(g.get("double").unwrap().as_i64().unwrap() * 2)
            }),
    )
    .unwrap();
    assert_eq!(store.getter("quadruple"), Some(json!(12)));
}

#[test]
fn test_register_module_adds_state_and_behavior() {
    let store = app_store();
    store
        .register_module(
            &["session"],
            ModuleConfig::new()
                .namespaced(true)
                .state(json!({"user": null}))
                .getter("logged_in", |g| json!(!g.state()["user"].is_null())),
        )
        .unwrap();

    assert_eq!(store.state_at(&["session"]), json!({"user": null}));
    assert_eq!(store.getter("session/logged_in"), Some(json!(false)));
}

#[test]
fn test_register_nested_module_path() {
    let store = app_store();
    store
        .register_module(
            &["cart", "coupons"],
            ModuleConfig::new().namespaced(true).state(json!({"codes": []})),
        )
        .unwrap();

    assert_eq!(store.state_at(&["cart", "coupons"]), json!({"codes": []}));
    assert_eq!(
        store.namespace_path("cart/coupons/"),
        Some(vec!["cart".to_string(), "coupons".to_string()])
    );
}

#[test]
fn test_register_module_preserve_state() {
    let store = app_store();
    let mut hydrated = store.state();
    hydrated["session"] = json!({"user": "alice"});
    store.replace_state(hydrated);

    store
        .register_module_with(
            &["session"],
            ModuleConfig::new()
                .namespaced(true)
                .state(json!({"user": null})),
            RegisterOptions {
                preserve_state: true,
            },
        )
        .unwrap();

    // The hydrated slice wins over the module's initial state.
    assert_eq!(store.state_at(&["session"]), json!({"user": "alice"}));
}

#[test]
fn test_unregister_module_removes_state_and_behavior() {
    let store = app_store();
    store
        .register_module(
            &["session"],
            ModuleConfig::new()
                .namespaced(true)
                .state(json!({"user": null}))
                .getter("logged_in", |g| json!(!g.state()["user"].is_null())),
        )
        .unwrap();
    assert_eq!(store.getter("session/logged_in"), Some(json!(false)));

    store.unregister_module(&["session"]).unwrap();

    assert!(store.state().get("session").is_none());
    assert!(!store.has_getter("session/logged_in"));
    assert_eq!(store.getter("session/logged_in"), None);

    // Survivors keep working after the registry rebuild.
    store.commit("increment").unwrap();
    assert_eq!(store.getter("double"), Some(json!(2)));
}

#[test]
fn test_hot_update_swaps_behavior_keeps_state() {
    let store = Store::new(
        ModuleConfig::new()
            .state(json!({"count": 10}))
            .mutation("step", |state, _| {
                state["count"] = json!(state["count"].as_i64().unwrap() + 1);
                Ok(())
            }),
    )
    .unwrap();
    store.commit("step").unwrap();

    store
        .hot_update(ModuleConfig::new().mutation("step", |state, _| {
            state["count"] = json!(state["count"].as_i64().unwrap() + 100);
            Ok(())
        }))
        .unwrap();

    // State survived the swap; the new handler takes over.
    store.commit("step").unwrap();
    assert_eq!(store.state()["count"], json!(111));
}

#[test]
fn test_hot_update_forces_getter_reevaluation() {
    let store = Store::new(
        ModuleConfig::new()
            .state(json!({"count": 2}))
            .getter("derived", |g| g.state()["count"].clone()),
    )
    .unwrap();
    assert_eq!(store.getter("derived"), Some(json!(2)));

    store
        .hot_update(ModuleConfig::new().getter("derived", |g| {
            json!(g.state()["count"].as_i64().unwrap() * -1)
        }))
        .unwrap();

    assert_eq!(store.getter("derived"), Some(json!(-2)));
}

#[test]
fn test_hot_update_unknown_child_leaves_store_usable() {
    let store = app_store();
    store
        .hot_update(ModuleConfig::new().module("ghost", ModuleConfig::new()))
        .unwrap();

    // The ghost subtree was not created; everything else still works.
    assert!(store.state().get("ghost").is_none());
    store.commit("increment").unwrap();
    assert_eq!(store.state()["count"], json!(1));
}

#[test]
fn test_watch_getter_value() {
    let store = app_store();
    let fired: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let fired_clone = Arc::clone(&fired);
    store.watch(
        |_, getters| getters.get("double").unwrap_or(Value::Null),
        move |new, _| fired_clone.lock().unwrap().push(new.clone()),
    );

    store.commit("increment").unwrap();
    store.commit("increment").unwrap();
    store.commit(("cart/push", json!("x"))).unwrap(); // double unchanged

    assert_eq!(*fired.lock().unwrap(), vec![json!(2), json!(4)]);
}

#[test]
fn test_watch_stop() {
    let store = app_store();
    let count = Arc::new(Mutex::new(0));
    let count_clone = Arc::clone(&count);
    let handle = store.watch(
        |state, _| state["count"].clone(),
        move |_, _| *count_clone.lock().unwrap() += 1,
    );

    store.commit("increment").unwrap();
    handle.stop();
    store.commit("increment").unwrap();

    assert_eq!(*count.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_event_stream_sees_lifecycle() {
    let store = app_store();
    let stream = store.event_stream(16);

    store.commit("increment").unwrap();
    store
        .register_module(&["session"], ModuleConfig::new().state(json!({})))
        .unwrap();
    store.dispatch(("cart/add_item", json!("fig"))).await.unwrap();

    assert!(matches!(
        stream.try_recv().unwrap(),
        StoreEvent::Mutation { kind, .. } if kind == "increment"
    ));
    assert!(matches!(
        stream.try_recv().unwrap(),
        StoreEvent::ModuleRegistered { path } if path == "session"
    ));
    assert!(matches!(
        stream.try_recv().unwrap(),
        StoreEvent::ActionStart { kind, .. } if kind == "cart/add_item"
    ));
    // The action commits before completing.
    assert!(matches!(
        stream.try_recv().unwrap(),
        StoreEvent::Mutation { kind, .. } if kind == "cart/push"
    ));
    assert!(matches!(
        stream.try_recv().unwrap(),
        StoreEvent::ActionDone { kind } if kind == "cart/add_item"
    ));
}

#[tokio::test]
async fn test_local_getter_keys_are_prefix_stripped() {
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_action = Arc::clone(&seen);

    let store = Store::new(
        ModuleConfig::new()
            .state(json!({}))
            .getter("root_only", |_| json!(0))
            .module(
                "m",
                ModuleConfig::new()
                    .namespaced(true)
                    .state(json!({"n": 1}))
                    .getter("a", |_| json!(1))
                    .getter("b", |_| json!(2))
                    .action("list", move |ctx, _| {
                        let seen = Arc::clone(&seen_action);
                        async move {
                            *seen.lock().unwrap() = ctx.getters().keys();
                            Ok(Value::Null)
                        }
                    }),
            ),
    )
    .unwrap();

    store.dispatch("m/list").await.unwrap();

    // Root getters are invisible; local names lose the "m/" prefix.
    assert_eq!(*seen.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
}
