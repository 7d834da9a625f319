/// End-to-end render cycles against the in-memory host
use crate::testing::{HostOp, MemoryHost, NodeHandle};
use crate::{
    Component, Element, EventHandler, FrameLoop, Hooks, Phase, PropValue, Props, ReconcileError,
    Reconciler, ReconcilerConfig, StateSetter, StepBudget, TEXT_VALUE, Unbounded, WorkStatus,
};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::Arc;

fn setup() -> (Reconciler<MemoryHost>, NodeHandle) {
    let mut host = MemoryHost::new();
    let container = host.create_container();
    (Reconciler::new(host), container)
}

fn list(items: &[&str]) -> Element {
    Element::build("ul")
        .children(
            items
                .iter()
                .map(|item| Element::build("li").text(*item).finish()),
        )
        .finish()
}

fn stateful(_: &Props, hooks: &mut Hooks<'_>) -> Element {
    let (value, _) = hooks.use_state(1u32);
    Element::build("span").text(value.to_string()).finish()
}

fn two_slots(_: &Props, hooks: &mut Hooks<'_>) -> Element {
    let (a, _) = hooks.use_state(2u32);
    let (b, _) = hooks.use_state(3u32);
    Element::build("em").text(format!("{a}{b}")).finish()
}

fn counter(_: &Props, hooks: &mut Hooks<'_>) -> Element {
    let (count, set_count) = hooks.use_state(0i64);
    Element::build("button")
        .on(
            "onClick",
            EventHandler::new(move |_| set_count.update(|n| n + 1)),
        )
        .text(format!("count: {count}"))
        .finish()
}

fn broken(_: &Props, _: &mut Hooks<'_>) -> Element {
    panic!("boom")
}

fn fine(_: &Props, _: &mut Hooks<'_>) -> Element {
    Element::build("b").text("ok").finish()
}

fn component(render: Component) -> Element {
    Element::component(render, Props::default())
}

fn count_creates(ops: &[HostOp], text: bool) -> usize {
    ops.iter()
        .filter(|op| matches!(op, HostOp::Create { is_text, .. } if *is_text == text))
        .count()
}

#[test]
fn first_render_places_whole_tree() {
    let (mut reconciler, container) = setup();

    reconciler.render(
        Element::build("div")
            .prop("id", "app")
            .child(Element::build("h1").prop("title", "x").text("hello").finish())
            .finish(),
        container,
    );
    let report = reconciler.flush().unwrap().unwrap();

    assert_eq!(report.placed, ["div", "h1", "#text"]);
    assert!(report.updated.is_empty());
    // Only the appends are planned; initial props went onto detached nodes.
    assert_eq!(report.mutations, 3);
    assert_eq!(
        reconciler.host().markup(container),
        "<div id=\"app\"><h1 title=\"x\">hello</h1></div>"
    );
    assert_eq!(reconciler.phase(), Phase::Idle);
}

#[test]
fn rendering_same_tree_twice_changes_nothing() {
    let (mut reconciler, container) = setup();
    let page = || {
        Element::build("div")
            .prop("id", "app")
            .child(Element::build("h1").prop("title", "x").text("hello").finish())
            .finish()
    };

    reconciler.render(page(), container);
    reconciler.flush().unwrap();
    reconciler.host_mut().take_ops();

    reconciler.render(page(), container);
    let report = reconciler.flush().unwrap().unwrap();

    assert_eq!(report.updated, ["div", "h1", "#text"]);
    assert!(report.placed.is_empty());
    assert!(report.deleted.is_empty());
    assert!(report.is_noop());
    assert!(reconciler.host().ops().is_empty());
}

#[test]
fn kind_change_replaces_output_node() {
    let (mut reconciler, container) = setup();

    reconciler.render(
        Element::build("div")
            .child(Element::build("h1").text("a").finish())
            .finish(),
        container,
    );
    reconciler.flush().unwrap();
    let old_h1 = reconciler.host().find(container, "h1").unwrap();

    reconciler.render(
        Element::build("div")
            .child(Element::build("p").text("a").finish())
            .finish(),
        container,
    );
    let report = reconciler.flush().unwrap().unwrap();

    assert_eq!(report.updated, ["div"]);
    assert_eq!(report.deleted, ["h1"]);
    assert_eq!(report.placed, ["p", "#text"]);
    assert_eq!(reconciler.host().markup(container), "<div><p>a</p></div>");
    assert_eq!(reconciler.host().find(container, "h1"), None);
    assert_ne!(reconciler.host().find(container, "p"), Some(old_h1));
}

#[test]
fn shrinking_and_growing_lists() {
    let (mut reconciler, container) = setup();
    reconciler.render(list(&["A", "B", "C"]), container);
    reconciler.flush().unwrap();

    reconciler.render(list(&["A", "B"]), container);
    let shrink = reconciler.flush().unwrap().unwrap();

    assert_eq!(shrink.deleted, ["li"]);
    assert_eq!(shrink.updated, ["ul", "li", "#text", "li", "#text"]);
    assert!(shrink.placed.is_empty());
    assert_eq!(
        reconciler.host().markup(container),
        "<ul><li>A</li><li>B</li></ul>"
    );

    reconciler.render(list(&["A", "B", "C"]), container);
    let grow = reconciler.flush().unwrap().unwrap();

    assert_eq!(grow.placed, ["li", "#text"]);
    assert!(grow.deleted.is_empty());
    assert_eq!(
        reconciler.host().markup(container),
        "<ul><li>A</li><li>B</li><li>C</li></ul>"
    );
}

#[test]
fn property_diff_touches_only_changed_keys() {
    let (mut reconciler, container) = setup();
    let heading = |title: Option<&str>| {
        let builder = Element::build("h1").prop("id", "main");
        let builder = match title {
            Some(title) => builder.prop("title", title),
            None => builder,
        };
        builder.text("hi").finish()
    };

    reconciler.render(heading(Some("x")), container);
    reconciler.flush().unwrap();
    let h1 = reconciler.host().find(container, "h1").unwrap();
    reconciler.host_mut().take_ops();

    reconciler.render(heading(Some("y")), container);
    reconciler.flush().unwrap();
    assert_eq!(
        reconciler.host_mut().take_ops(),
        [HostOp::SetProperty {
            node: h1,
            name: "title".to_owned(),
            value: PropValue::from("y"),
        }]
    );

    reconciler.render(heading(None), container);
    reconciler.flush().unwrap();
    assert_eq!(
        reconciler.host_mut().take_ops(),
        [HostOp::RemoveProperty {
            node: h1,
            name: "title".to_owned(),
        }]
    );
    assert_eq!(reconciler.host().property(h1, "title"), None);
}

#[test]
fn changed_handler_is_swapped_exactly_once() {
    let (mut reconciler, container) = setup();
    let first = EventHandler::new(|_| {});
    let second = EventHandler::new(|_| {});
    let button = |handler: &EventHandler| {
        Element::build("button")
            .on("onClick", handler.clone())
            .finish()
    };

    reconciler.render(button(&first), container);
    reconciler.flush().unwrap();
    let node = reconciler.host().find(container, "button").unwrap();
    reconciler.host_mut().take_ops();

    reconciler.render(button(&second), container);
    reconciler.flush().unwrap();
    assert_eq!(
        reconciler.host_mut().take_ops(),
        [
            HostOp::RemoveListener {
                node,
                event: "click".to_owned(),
            },
            HostOp::AddListener {
                node,
                event: "click".to_owned(),
            },
        ]
    );
    assert_eq!(reconciler.host().listener_count(node, "click"), 1);

    // The same handler again is not a change.
    reconciler.render(button(&second), container);
    reconciler.flush().unwrap();
    assert!(reconciler.host().ops().is_empty());
}

#[test]
fn hello_world_to_hello_new_day() {
    let (mut reconciler, container) = setup();

    reconciler.render(
        Element::build("div")
            .child(Element::build("h1").text("hello world").finish())
            .child(Element::build("h1").text("hello summer").finish())
            .finish(),
        container,
    );
    reconciler.flush().unwrap();
    let first_h1 = reconciler.host().find(container, "h1").unwrap();
    reconciler.host_mut().take_ops();

    reconciler.render(
        Element::build("div")
            .child(Element::build("h1").text("hello world").finish())
            .child(Element::build("p").text("hello new day").finish())
            .finish(),
        container,
    );
    let report = reconciler.flush().unwrap().unwrap();

    assert_eq!(report.updated, ["div", "h1", "#text"]);
    assert_eq!(report.deleted, ["h1"]);
    assert_eq!(report.placed, ["p", "#text"]);

    let ops = reconciler.host().ops();
    // One text node for the new paragraph, none for the kept heading.
    assert_eq!(count_creates(ops, true), 1);
    assert_eq!(count_creates(ops, false), 1);
    assert_eq!(reconciler.host().find(container, "h1"), Some(first_h1));
    assert_eq!(
        reconciler.host().markup(container),
        "<div><h1>hello world</h1><p>hello new day</p></div>"
    );
}

fn middle_replaced() -> Element {
    Element::build("ul")
        .child(Element::build("li").text("a").finish())
        .child(Element::build("p").text("new").finish())
        .child(Element::build("li").text("c").finish())
        .finish()
}

#[test]
fn replacing_middle_child_keeps_sibling_order() {
    cov_mark::check!(reused_node_moved_behind_placement);
    let (mut reconciler, container) = setup();
    reconciler.render(list(&["a", "b", "c"]), container);
    reconciler.flush().unwrap();
    let ul = reconciler.host().children(container)[0];
    let last = reconciler.host().children(ul)[2];

    reconciler.render(middle_replaced(), container);
    reconciler.flush().unwrap();
    assert_eq!(
        reconciler.host().markup(container),
        "<ul><li>a</li><p>new</p><li>c</li></ul>"
    );
    // Moved, not recreated.
    assert_eq!(reconciler.host().children(ul)[2], last);

    reconciler.render(list(&["a", "b", "c"]), container);
    reconciler.flush().unwrap();
    assert_eq!(
        reconciler.host().markup(container),
        "<ul><li>a</li><li>b</li><li>c</li></ul>"
    );
}

#[test]
fn nan_property_is_not_rewritten() {
    let (mut reconciler, container) = setup();
    let meter = || Element::build("meter").prop("value", f64::NAN).finish();

    reconciler.render(meter(), container);
    reconciler.flush().unwrap();
    reconciler.host_mut().take_ops();

    reconciler.render(meter(), container);
    let report = reconciler.flush().unwrap().unwrap();
    assert!(report.is_noop());
    assert!(reconciler.host().ops().is_empty());
}

#[test]
fn phases_follow_the_cycle() {
    let (mut reconciler, container) = setup();
    assert_eq!(reconciler.phase(), Phase::Idle);

    reconciler.render(Element::host("br"), container);
    assert_eq!(reconciler.phase(), Phase::RenderInProgress);
    assert!(reconciler.has_more_work());

    // Root, then the `br` fiber.
    assert!(reconciler.step().unwrap());
    assert!(!reconciler.step().unwrap());
    assert_eq!(reconciler.phase(), Phase::RenderComplete);
    assert!(reconciler.host().children(container).is_empty());

    let report = reconciler.commit().unwrap().unwrap();
    assert_eq!(report.placed, ["br"]);
    assert_eq!(reconciler.phase(), Phase::Idle);
    assert_eq!(reconciler.host().markup(container), "<br></br>");
}

#[test]
fn yielded_render_leaves_host_untouched() {
    let (mut reconciler, container) = setup();
    reconciler.render(list(&["A", "B", "C"]), container);

    let status = reconciler.work_loop(&mut StepBudget::new(2)).unwrap();

    assert_eq!(status, WorkStatus::Yielded);
    assert_eq!(reconciler.phase(), Phase::RenderInProgress);
    assert!(reconciler.host().children(container).is_empty());
    assert!(reconciler.committed_snapshot().is_empty());
    assert!(!reconciler.pending_snapshot().is_empty());

    let mut status = status;
    while status == WorkStatus::Yielded {
        status = reconciler.work_loop(&mut StepBudget::new(2)).unwrap();
    }
    assert!(matches!(status, WorkStatus::Committed(_)));
    assert_eq!(
        reconciler.host().markup(container),
        "<ul><li>A</li><li>B</li><li>C</li></ul>"
    );
}

#[test]
fn state_survives_unrelated_rerenders() {
    let (mut reconciler, container) = setup();
    let setters: Arc<Mutex<Option<(StateSetter<i32>, StateSetter<String>)>>> =
        Arc::new(Mutex::new(None));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let exported = setters.clone();
    let log = seen.clone();
    let widget = Component::new(move |_, hooks| {
        let (count, set_count) = hooks.use_state(0i32);
        let (label, set_label) = hooks.use_state(String::from("a"));
        *exported.lock() = Some((set_count, set_label));
        log.lock().push((count, label.clone()));
        Element::build("span")
            .text(format!("{label}:{count}"))
            .finish()
    });
    let app = |title: &str| {
        Element::build("div")
            .prop("title", title)
            .child(component(widget.clone()))
            .finish()
    };

    reconciler.render(app("1"), container);
    reconciler.flush().unwrap();
    let (set_count, set_label) = setters.lock().clone().unwrap();

    set_count.update(|n| n + 1);
    set_label.set("b".to_owned());
    set_count.update(|n| n * 10);

    // An unrelated render request arrives before the update is processed.
    reconciler.render(app("2"), container);
    reconciler.flush().unwrap();
    assert_eq!(seen.lock().last(), Some(&(10, "b".to_owned())));
    assert_eq!(
        reconciler.host().markup(container),
        "<div title=\"2\"><span>b:10</span></div>"
    );

    // Nothing queued: the committed values stay.
    reconciler.render(app("3"), container);
    reconciler.flush().unwrap();
    assert_eq!(seen.lock().last(), Some(&(10, "b".to_owned())));

    set_count.update(|n| n + 5);
    reconciler.flush().unwrap();
    assert_eq!(seen.lock().last(), Some(&(15, "b".to_owned())));
    assert_eq!(reconciler.hook_store().len(), 2);
}

#[test]
fn counter_updates_through_dispatched_events() {
    cov_mark::check!(rerender_request_coalesced);
    let (mut reconciler, container) = setup();
    reconciler.render(component(Component::new(counter)), container);
    reconciler.flush().unwrap();

    let button = reconciler.host().find(container, "button").unwrap();
    assert_eq!(
        reconciler.host().markup(container),
        "<button>count: 0</button>"
    );

    assert_eq!(reconciler.host().dispatch(button, "click"), 1);
    assert!(!reconciler.is_idle());
    reconciler.flush().unwrap();
    assert_eq!(
        reconciler.host().markup(container),
        "<button>count: 1</button>"
    );
    // The handler is a new closure each render: swapped, never duplicated.
    assert_eq!(reconciler.host().listener_count(button, "click"), 1);

    reconciler.host().dispatch(button, "click");
    reconciler.host().dispatch(button, "click");
    let status = reconciler.work_loop(&mut Unbounded).unwrap();
    assert!(matches!(status, WorkStatus::Committed(_)));
    assert_eq!(
        reconciler.work_loop(&mut Unbounded).unwrap(),
        WorkStatus::Idle
    );
    assert_eq!(
        reconciler.host().markup(container),
        "<button>count: 3</button>"
    );
}

#[test]
fn setter_before_first_commit_restarts_render() {
    cov_mark::check!(rerender_restarts_pending_cycle);
    let (mut reconciler, container) = setup();
    let setter: Arc<Mutex<Option<StateSetter<u32>>>> = Arc::new(Mutex::new(None));
    let exported = setter.clone();
    let widget = Component::new(move |_, hooks| {
        let (value, set_value) = hooks.use_state(0u32);
        *exported.lock() = Some(set_value);
        Element::text(value.to_string())
    });

    reconciler.render(component(widget), container);
    reconciler.step().unwrap();
    reconciler.step().unwrap();
    assert_eq!(reconciler.hook_store().len(), 1);

    setter.lock().clone().unwrap().set(7);
    reconciler.flush().unwrap().unwrap();

    // No committed base existed, so the restarted render begins from the
    // initial value with a fresh cell; the first cell is gone.
    assert_eq!(reconciler.host().markup(container), "0");
    assert_eq!(reconciler.hook_store().len(), 1);
    assert!(reconciler.is_idle());
}

#[test]
fn state_update_mid_cycle_rerenders_committed_tree() {
    let (mut reconciler, container) = setup();
    let setter: Arc<Mutex<Option<StateSetter<u32>>>> = Arc::new(Mutex::new(None));
    let exported = setter.clone();
    let widget = Component::new(move |_, hooks| {
        let (value, set_value) = hooks.use_state(0u32);
        *exported.lock() = Some(set_value);
        Element::text(value.to_string())
    });
    let app = |title: &str| {
        Element::build("div")
            .prop("title", title)
            .child(component(widget.clone()))
            .finish()
    };

    reconciler.render(app("A"), container);
    reconciler.flush().unwrap();
    let set_value = setter.lock().clone().unwrap();

    // Only the root of the new request has been visited.
    reconciler.render(app("B"), container);
    assert!(reconciler.step().unwrap());
    set_value.set(5);
    reconciler.flush().unwrap();

    assert_eq!(
        reconciler.host().markup(container),
        "<div title=\"A\">5</div>"
    );
}

#[test]
fn deleting_component_frees_its_state() {
    cov_mark::check!(deleted_component_descends_to_host);
    let (mut reconciler, container) = setup();
    let setter: Arc<Mutex<Option<StateSetter<u32>>>> = Arc::new(Mutex::new(None));
    let exported = setter.clone();
    let widget = Component::new(move |_, hooks| {
        let (value, set_value) = hooks.use_state(0u32);
        *exported.lock() = Some(set_value);
        Element::build("span").text(value.to_string()).finish()
    });

    reconciler.render(
        Element::build("div").child(component(widget)).finish(),
        container,
    );
    reconciler.flush().unwrap();
    assert_eq!(reconciler.hook_store().len(), 1);

    reconciler.render(Element::host("div"), container);
    let report = reconciler.flush().unwrap().unwrap();

    assert_eq!(report.deleted.len(), 1);
    assert_eq!(reconciler.host().markup(container), "<div></div>");
    assert!(reconciler.hook_store().is_empty());

    // The unmounted component's setter is inert.
    setter.lock().clone().unwrap().set(3);
    assert!(reconciler.is_idle());
}

#[test]
fn abandoned_cycle_frees_fibers_and_cells() {
    cov_mark::check!(pending_cycle_abandoned);
    let (mut reconciler, container) = setup();
    let view = || {
        Element::build("div")
            .child(component(Component::new(stateful)))
            .finish()
    };

    reconciler.render(view(), container);
    reconciler.flush().unwrap();
    // root, div, stateful, span, #text
    assert_eq!(reconciler.fibers().len(), 5);
    assert_eq!(reconciler.hook_store().len(), 1);
    let committed = reconciler.committed_snapshot();

    reconciler.render(
        Element::build("div")
            .child(component(Component::new(two_slots)))
            .finish(),
        container,
    );
    // root, div, then the component allocates its two cells.
    let status = reconciler.work_loop(&mut StepBudget::new(3)).unwrap();
    assert_eq!(status, WorkStatus::Yielded);
    assert_eq!(reconciler.hook_store().len(), 3);

    reconciler.render(view(), container);
    assert_eq!(reconciler.hook_store().len(), 1);
    assert_eq!(reconciler.fibers().len(), 5 + 1);
    assert_eq!(reconciler.committed_snapshot(), committed);

    let report = reconciler.flush().unwrap().unwrap();
    assert!(report.deleted.is_empty());
    assert_eq!(reconciler.fibers().len(), 5);
    assert_eq!(reconciler.host().markup(container), "<div><span>1</span></div>");
}

#[test]
fn failed_commit_rolls_back_everything() {
    cov_mark::check!(commit_rolled_back);
    let (mut reconciler, container) = setup();
    let view = |title: &str, second: Element| {
        Element::build("ul")
            .prop("title", title)
            .child(Element::build("li").text("a").finish())
            .child(second)
            .finish()
    };

    reconciler.render(view("x", Element::build("li").text("b").finish()), container);
    reconciler.flush().unwrap();
    let before_markup = reconciler.host().markup(container);
    let before_tree = reconciler.committed_snapshot();

    reconciler.render(view("y", Element::build("p").text("c").finish()), container);
    reconciler.host_mut().fail_next("append_child");
    let err = reconciler.flush().unwrap_err();

    // Removing `li b` and setting the title were applied, then undone.
    assert!(matches!(
        err,
        ReconcileError::CommitRolledBack { rolled_back: 2, .. }
    ));
    assert_eq!(reconciler.host().markup(container), before_markup);
    assert_eq!(reconciler.committed_snapshot(), before_tree);
    assert_eq!(reconciler.phase(), Phase::Idle);

    reconciler.render(view("y", Element::build("p").text("c").finish()), container);
    reconciler.flush().unwrap();
    assert_eq!(
        reconciler.host().markup(container),
        "<ul title=\"y\"><li>a</li><p>c</p></ul>"
    );
}

#[test]
fn failed_commit_restores_middle_child_position() {
    let (mut reconciler, container) = setup();
    reconciler.render(list(&["a", "b", "c"]), container);
    reconciler.flush().unwrap();
    let before_markup = reconciler.host().markup(container);
    let before_tree = reconciler.committed_snapshot();

    reconciler.render(middle_replaced(), container);
    reconciler.host_mut().fail_next("append_child");
    assert!(reconciler.flush().is_err());

    assert_eq!(reconciler.host().markup(container), before_markup);
    assert_eq!(reconciler.committed_snapshot(), before_tree);

    // The host and the committed tree agree, so the same tree is a no-op.
    reconciler.host_mut().take_ops();
    reconciler.render(list(&["a", "b", "c"]), container);
    reconciler.flush().unwrap();
    assert!(reconciler.host().ops().is_empty());
}

#[test]
fn failed_node_creation_discards_cycle() {
    let (mut reconciler, container) = setup();
    reconciler.host_mut().fail_next("create_node");

    reconciler.render(Element::build("div").text("x").finish(), container);
    let err = reconciler.flush().unwrap_err();

    assert!(matches!(&err, ReconcileError::Host(e) if e.operation == "create_node"));
    assert_eq!(reconciler.phase(), Phase::Idle);
    assert_eq!(reconciler.committed_root(), None);
    assert!(reconciler.fibers().is_empty());

    reconciler.render(Element::build("div").text("x").finish(), container);
    reconciler.flush().unwrap();
    assert_eq!(reconciler.host().markup(container), "<div>x</div>");
}

#[test]
fn panicking_component_does_not_disturb_siblings() {
    cov_mark::check!(component_panic_isolated);
    let (mut reconciler, container) = setup();

    reconciler.render(
        Element::build("div")
            .child(component(Component::new(broken)))
            .child(component(Component::new(fine)))
            .finish(),
        container,
    );
    let report = reconciler.flush().unwrap().unwrap();

    assert_eq!(report.faults.len(), 1);
    assert_eq!(report.faults[0].component, "broken");
    assert_eq!(report.faults[0].message, "boom");
    assert_eq!(reconciler.host().markup(container), "<div><b>ok</b></div>");
}

#[test]
#[should_panic(expected = "boom")]
fn panics_propagate_when_isolation_is_off() {
    let mut host = MemoryHost::new();
    let container = host.create_container();
    let mut reconciler =
        Reconciler::with_config(host, ReconcilerConfig::new().catch_component_panics(false));

    reconciler.render(component(Component::new(broken)), container);
    let _ = reconciler.flush();
}

#[test]
fn frame_loop_counts_failures_and_keeps_going() {
    let (mut reconciler, container) = setup();
    reconciler.host_mut().fail_next("create_node");
    reconciler.render(Element::host("br"), container);

    let stats = FrameLoop::new().run(&mut reconciler);
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.commits, 0);
    assert!(reconciler.is_idle());

    reconciler.render(Element::host("br"), container);
    let stats = FrameLoop::new().run(&mut reconciler);
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.commits, 1);
    assert_eq!(stats.mutations, 1);
    assert_eq!(reconciler.host().markup(container), "<br></br>");
}

#[test]
fn frame_loop_stops_at_frame_limit() {
    let (mut reconciler, container) = setup();
    reconciler.render(list(&["A", "B", "C", "D"]), container);

    // A zero budget yields after every unit.
    let stats = FrameLoop::new()
        .budget(std::time::Duration::ZERO)
        .max_frames(2)
        .run(&mut reconciler);

    assert_eq!(stats.frames, 2);
    assert_eq!(stats.commits, 0);
    assert_eq!(reconciler.phase(), Phase::RenderInProgress);
}

#[test]
fn text_content_lives_under_node_value() {
    let (mut reconciler, container) = setup();
    reconciler.render(Element::text("plain"), container);
    reconciler.flush().unwrap();

    let text = reconciler.host().children(container)[0];
    assert_eq!(
        reconciler.host().property(text, TEXT_VALUE),
        Some(&PropValue::from("plain"))
    );
}

#[derive(Debug, Clone)]
enum Shape {
    Text(String),
    Node(&'static str, Vec<Shape>),
    /// Stateful component wrapping a subtree.
    Counter(Vec<Shape>),
}

type Setters = Arc<Mutex<Vec<StateSetter<u32>>>>;

/// Every instance shares one closure type, so counters are reused by position.
fn counted(children: Vec<Element>, setters: Setters) -> Element {
    component(Component::new(move |_, hooks| {
        let (count, set_count) = hooks.use_state(0u32);
        setters.lock().push(set_count);
        Element::build("section")
            .prop("count", i64::from(count))
            .children(children.iter().cloned())
            .finish()
    }))
}

impl Shape {
    fn element(&self, setters: &Setters) -> Element {
        match self {
            Shape::Text(text) => Element::text(text.clone()),
            Shape::Node(tag, children) => Element::build(tag)
                .children(children.iter().map(|child| child.element(setters)))
                .finish(),
            Shape::Counter(children) => counted(
                children.iter().map(|child| child.element(setters)).collect(),
                setters.clone(),
            ),
        }
    }

    fn has_counter(&self) -> bool {
        match self {
            Shape::Text(_) => false,
            Shape::Node(_, children) => children.iter().any(Shape::has_counter),
            Shape::Counter(_) => true,
        }
    }
}

fn shape() -> impl Strategy<Value = Shape> {
    let leaf = "[a-z]{1,3}".prop_map(Shape::Text);
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            3 => (
                prop::sample::select(vec!["div", "p", "span"]),
                prop::collection::vec(inner.clone(), 0..4),
            )
                .prop_map(|(tag, children)| Shape::Node(tag, children)),
            1 => prop::collection::vec(inner, 0..3).prop_map(Shape::Counter),
        ]
    })
}

/// Render each shape in turn, yielding every `slice` units if given.
fn render_all(shapes: &[Shape], slice: Option<usize>) -> (String, Vec<HostOp>) {
    let (mut reconciler, container) = setup();
    let setters = Setters::default();
    for shape in shapes {
        reconciler.render(shape.element(&setters), container);
        match slice {
            None => {
                reconciler.flush().unwrap();
            }
            Some(units) => loop {
                match reconciler.work_loop(&mut StepBudget::new(units)).unwrap() {
                    WorkStatus::Yielded => continue,
                    WorkStatus::Committed(_) | WorkStatus::Idle => break,
                }
            },
        }
    }
    let markup = reconciler.host().markup(container);
    (markup, reconciler.host_mut().take_ops())
}

/// Commit `first`, request `second`, run `units` units of it, then bump every
/// committed counter before finishing.
fn render_with_update(
    first: &Shape,
    second: &Shape,
    units: usize,
) -> (String, Vec<crate::FiberSnapshot>) {
    let (mut reconciler, container) = setup();
    let setters = Setters::default();
    reconciler.render(first.element(&setters), container);
    reconciler.flush().unwrap();
    let committed: Vec<_> = setters.lock().drain(..).collect();

    reconciler.render(second.element(&setters), container);
    for _ in 0..units {
        if !reconciler.step().unwrap() {
            break;
        }
    }
    for setter in &committed {
        setter.update(|n| n + 1);
    }
    reconciler.flush().unwrap();
    (
        reconciler.host().markup(container),
        reconciler.committed_snapshot(),
    )
}

proptest! {
    #[test]
    fn interrupted_render_matches_uninterrupted(
        first in shape(),
        second in shape(),
        slice in 1usize..5,
    ) {
        let shapes = [first, second];
        let reference = render_all(&shapes, None);
        let sliced = render_all(&shapes, Some(slice));

        prop_assert_eq!(&reference.0, &sliced.0);
        prop_assert_eq!(reference.1, sliced.1);
    }

    #[test]
    fn state_update_between_slices_matches_update_before_work(
        first in shape(),
        second in shape(),
        units in 1usize..6,
    ) {
        let reference = render_with_update(&first, &second, 0);
        let sliced = render_with_update(&first, &second, units);

        prop_assert_eq!(&reference, &sliced);
        if first.has_counter() {
            prop_assert!(reference.0.contains("count=\"1\""));
            prop_assert!(!reference.0.contains("count=\"0\""));
        }
    }
}
