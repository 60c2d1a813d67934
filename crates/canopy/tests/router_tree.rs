//! Integration tests building a small application out of routers, components
//! and builders.

use std::sync::Arc;

use canopy::prelude::*;
use canopy::{ChildChange, RouterError};
use parking_lot::Mutex;

fn setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Score {
    player1: u32,
    player2: u32,
}

type ScoreRelay = Arc<CurrentValueRelay<Score>>;

struct LoggedInDependency {
    score: ScoreRelay,
}

struct GameDependency {
    player1: String,
    score: ScoreRelay,
}

/// Game logic that only counts wins while its scope is active.
struct GameInteractor {
    base: PresentableInteractor,
    player1: String,
    score: ScoreRelay,
}

impl GameInteractor {
    fn record_win(&self, player1_won: bool) {
        if !self.base.is_active() {
            return;
        }
        self.score.update(|score| {
            if player1_won {
                score.player1 += 1;
            } else {
                score.player2 += 1;
            }
        });
    }
}

impl Interactable for GameInteractor {
    fn scope_lifecycle(&self) -> &ScopeLifecycle {
        self.base.scope_lifecycle()
    }
}

impl PresentableInteractable for GameInteractor {
    fn view_lifecycle(&self) -> &ViewLifecycle {
        self.base.view_lifecycle()
    }
}

fn game_builder(component: Arc<Component<GameDependency>>) -> AnyDynamicBuilder<String, Arc<Router<GameInteractor>>> {
    AnyDynamicBuilder::new(move |name: String| {
        let dependency = component.dependency();
        Router::presentable(GameInteractor {
            base: PresentableInteractor::new(name),
            player1: dependency.player1.clone(),
            score: dependency.score.clone(),
        })
    })
}

#[test]
fn test_login_flow_swaps_children() {
    setup();
    let root = Router::new(Interactor::new("root"));
    let logged_out = Router::new(Interactor::new("logged_out"));
    root.attach_child(logged_out.clone());
    root.activate_root();
    assert!(logged_out.is_active());

    let monitor = root.children_changed().subscribe_channel();

    // Log in: swap the logged-out unit for the logged-in one.
    let logged_out_dyn: Arc<dyn Routing> = logged_out.clone();
    root.detach_child(&logged_out_dyn);
    let logged_in = Router::new(Interactor::new("logged_in"));
    root.attach_child(logged_in.clone());

    assert!(!logged_out.is_active());
    assert!(logged_in.is_active());
    let names: Vec<String> = root.children().iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["logged_in"]);

    let changes: Vec<ChildChange> = monitor.try_iter().map(|e| e.change).collect();
    assert_eq!(changes, vec![ChildChange::Detached, ChildChange::Attached]);
}

#[test]
fn test_game_reports_score_through_relay() {
    setup();
    let root_component = Component::new(());
    let score: ScoreRelay = root_component.shared(|| Arc::new(CurrentValueRelay::new(Score::default())));

    let logged_in_component = Component::new(LoggedInDependency {
        score: score.clone(),
    });
    let game_component = Arc::new(Component::new(GameDependency {
        player1: "ada".to_string(),
        score: logged_in_component.dependency().score.clone(),
    }));
    let build_game = game_builder(game_component);

    let root = Router::new(Interactor::new("root"));
    let logged_in = Router::new(Interactor::new("logged_in"));
    root.attach_child(logged_in.clone());

    let game = build_game.build("tic_tac_toe".to_string());
    assert_eq!(game.interactor().player1, "ada");
    logged_in.attach_child(game.clone());

    // Inactive tree: wins are ignored.
    game.interactor().record_win(true);
    assert_eq!(score.value(), Score::default());

    root.activate_root();
    game.interactor().record_win(true);
    game.interactor().record_win(false);
    assert_eq!(score.value(), Score { player1: 1, player2: 1 });

    root.deactivate_root();
    game.interactor().record_win(true);
    assert_eq!(score.value().player1, 1);
}

#[test]
fn test_router_hooks_follow_tree_and_view() {
    setup();
    let root = Router::new(Interactor::new("root"));
    let screen = Router::presentable(PresentableInteractor::view_bound("screen"));
    let events = Arc::new(Mutex::new(Vec::new()));
    let events_clone = events.clone();
    screen.on_event(move |event| events_clone.lock().push(*event));

    root.attach_child(screen.clone());
    let view = screen.view_lifecycle().cloned().unwrap();
    view.did_load();
    view.did_appear();

    // The view is on screen but the tree is not running yet.
    assert!(!screen.is_active());
    assert_eq!(
        *events.lock(),
        vec![RouterEvent::ViewDidLoad, RouterEvent::ViewDidAppear]
    );

    root.activate_root();
    assert!(screen.is_active());
    view.did_disappear();
    assert!(!screen.is_active());
    assert!(root.is_root_active());

    assert_eq!(
        *events.lock(),
        vec![
            RouterEvent::ViewDidLoad,
            RouterEvent::ViewDidAppear,
            RouterEvent::DidLoad,
            RouterEvent::DidBecomeActive,
            RouterEvent::DidBecomeInactive,
            RouterEvent::ViewDidDisappear,
        ]
    );
}

#[test]
fn test_child_has_exactly_one_parent_router() {
    setup();
    let first = Router::new(Interactor::new("first"));
    let second = Router::new(Interactor::new("second"));
    let child = Router::new(Interactor::new("shared_child"));

    first.attach_child(child.clone());
    let err = second.try_attach_child(child.clone()).unwrap_err();
    assert!(matches!(err, RouterError::Scope(_)));

    let child_dyn: Arc<dyn Routing> = child.clone();
    first.detach_child(&child_dyn);
    second.attach_child(child.clone());
    assert_eq!(child.scope_lifecycle().parent(), Some(second.scope_lifecycle().id()));
}

#[test]
fn test_deep_tree_deactivates_bottom_up() {
    setup();
    let order = Arc::new(Mutex::new(Vec::new()));
    let routers: Vec<Arc<Router<Interactor>>> = ["a", "b", "c", "d"]
        .iter()
        .map(|name| Router::new(Interactor::new(*name)))
        .collect();
    for (name, router) in ["a", "b", "c", "d"].into_iter().zip(&routers) {
        let order = order.clone();
        router.on_event(move |event| {
            if *event == RouterEvent::DidBecomeInactive {
                order.lock().push(name);
            }
        });
    }
    for pair in routers.windows(2) {
        pair[0].attach_child(pair[1].clone());
    }

    routers[0].activate_root();
    assert!(routers.iter().all(|r| r.is_active()));
    routers[0].deactivate_root();

    assert_eq!(*order.lock(), vec!["d", "c", "b", "a"]);
}
