//! Recording functions called by instrumented programs.
//!
//! A [`TraceContext`] owns the [`TraceBuffer`] of exactly one run. Recorders
//! never fail: lookup and rendering problems degrade to a `"?"` placeholder.

pub mod inspect;
pub mod render;

use crate::config::TraceConfig;
use crate::models::{CallRecord, ConditionSite, LoopSite, PrevValue, Snapshot, TraceBuffer};
use indexmap::IndexMap;
pub use inspect::{Inspect, InspectError, ValueKind};
pub use render::{format_float, render_or_placeholder, render_value};

/// Name the tracer object is bound to inside instrumented programs.
pub const TRACER_NAME: &str = "_cpt_tracer";
/// Local holding the current call id inside traced functions.
pub const CALL_ID_NAME: &str = "_cpt_cid";
/// Identifiers starting with this prefix belong to the tracer.
pub const RESERVED_PREFIX: &str = "_cpt";

pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

#[derive(Debug)]
pub struct TraceContext {
    buffer: TraceBuffer,
    config: TraceConfig,
    next_call_id: u64,
}

fn lookup<V: Inspect>(scope: &V, name: &str) -> Option<V> {
    match scope.lookup(name) {
        Ok(value) => value,
        Err(e) => {
            log::debug!("scope lookup of {} failed: {}", name, e);
            None
        }
    }
}

/// Numeric end of a column value, used for delta transitions.
fn prev_value<V: Inspect>(value: &V, rendered: &str) -> PrevValue {
    match value.kind() {
        ValueKind::Int(i) => PrevValue::Int(i),
        ValueKind::Float(f) => PrevValue::Float(f),
        _ => PrevValue::Text(rendered.to_string()),
    }
}

fn prev_text(value: &PrevValue) -> String {
    match value {
        PrevValue::Int(i) => i.to_string(),
        PrevValue::Float(f) => format_float(*f),
        PrevValue::Text(s) => s.clone(),
    }
}

/// Human-readable transition between two column values.
pub fn transition(old: &PrevValue, new: &PrevValue) -> String {
    match (old, new) {
        (PrevValue::Int(a), PrevValue::Int(b)) => match b.checked_sub(*a) {
            Some(delta) if delta >= 0 => format!("{a}+{delta}={b}"),
            Some(delta) => format!("{a}-{}={b}", delta.unsigned_abs()),
            None => format!("{a}→{b}"),
        },
        _ => match (old.as_number(), new.as_number()) {
            (Some(a), Some(b)) => {
                let delta = b - a;
                let sign = if delta >= 0.0 { '+' } else { '-' };
                format!(
                    "{}{}{}={}",
                    prev_text(old),
                    sign,
                    format_float(delta.abs()),
                    prev_text(new)
                )
            }
            _ => format!("{}→{}", prev_text(old), prev_text(new)),
        },
    }
}

impl TraceContext {
    pub fn new(config: TraceConfig) -> Self {
        Self {
            buffer: TraceBuffer::new(),
            config,
            next_call_id: 1,
        }
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    pub fn buffer(&self) -> &TraceBuffer {
        &self.buffer
    }

    pub fn into_buffer(self) -> TraceBuffer {
        self.buffer
    }

    fn render<V: Inspect>(&self, value: &V) -> String {
        render_or_placeholder(value, &self.config)
    }

    fn add_columns<V: Inspect>(variables: &mut Vec<String>, scope: &V, tracked: &[String], loop_var: Option<&str>) {
        for name in tracked {
            if Some(name.as_str()) == loop_var || variables.contains(name) {
                continue;
            }
            if let Some(value) = lookup(scope, name) {
                if value.kind().is_tabular() {
                    variables.push(name.clone());
                }
            }
        }
    }

    /// Record a pre-loop (`initial`) or post-iteration snapshot of a loop site.
    pub fn record_loop<V: Inspect>(
        &mut self,
        site_id: usize,
        scope: &V,
        tracked: &[String],
        loop_var: Option<&str>,
        range: &str,
        initial: bool,
    ) {
        let config = &self.config;
        let site = self.buffer.loops.entry(site_id).or_insert_with(|| LoopSite {
            variables: loop_var.map(|v| vec![v.to_string()]).unwrap_or_default(),
            loop_var: loop_var.map(str::to_string),
            range: range.to_string(),
            ..LoopSite::default()
        });

        if initial {
            if site.has_initial {
                return;
            }
            site.has_initial = true;
            Self::add_columns(&mut site.variables, scope, tracked, loop_var);
            let mut values = IndexMap::new();
            for name in &site.variables {
                if Some(name.as_str()) == loop_var {
                    continue;
                }
                if let Some(value) = lookup(scope, name) {
                    let rendered = render_or_placeholder(&value, config);
                    site.prev_values.insert(name.clone(), prev_value(&value, &rendered));
                    values.insert(name.clone(), rendered);
                }
            }
            site.iterations.insert(0, Snapshot { values, exprs: None });
            return;
        }

        Self::add_columns(&mut site.variables, scope, tracked, loop_var);
        let mut values = IndexMap::new();
        let mut exprs = IndexMap::new();
        for name in &site.variables {
            let Some(value) = lookup(scope, name) else {
                continue;
            };
            let rendered = render_or_placeholder(&value, config);
            let current = prev_value(&value, &rendered);
            if Some(name.as_str()) != loop_var {
                if let Some(old) = site.prev_values.get(name) {
                    if *old != current {
                        exprs.insert(name.clone(), transition(old, &current));
                    }
                }
            }
            site.prev_values.insert(name.clone(), current);
            values.insert(name.clone(), rendered);
        }
        site.iterations.push(Snapshot {
            values,
            exprs: Some(exprs),
        });
    }

    pub fn record_condition<V: Inspect>(&mut self, result: V, site_id: usize, line: usize, source: &str) -> V {
        let truth = match result.truthy() {
            Ok(truth) => Some(truth),
            Err(e) => {
                log::debug!("condition at site {} not evaluable: {}", site_id, e);
                None
            }
        };
        self.record_truth(truth, site_id, line, source);
        result
    }

    /// Record an already evaluated condition; `None` is stored as `"?"`.
    pub fn record_truth(&mut self, truth: Option<bool>, site_id: usize, line: usize, source: &str) {
        let rendered = match truth {
            Some(true) => "True",
            Some(false) => "False",
            None => "?",
        };
        self.buffer
            .conditions
            .entry(site_id)
            .or_insert_with(|| ConditionSite {
                line,
                source: source.to_string(),
                values: Vec::new(),
            })
            .values
            .push(rendered.to_string());
    }

    /// Open a call record; `args` is a mapping of parameter names to values.
    pub fn record_call_enter<V: Inspect>(&mut self, func: &str, args: &V) -> u64 {
        let id = self.next_call_id;
        self.next_call_id += 1;

        let mut rendered = IndexMap::new();
        match args.entries() {
            Ok(entries) => {
                for (name, value) in entries {
                    if !is_reserved(&name) {
                        let text = self.render(&value);
                        rendered.insert(name, text);
                    }
                }
            }
            Err(e) => log::debug!("arguments of {} not readable: {}", func, e),
        }

        self.buffer.recursion.push(CallRecord {
            id,
            func: func.to_string(),
            args: rendered,
            parent: self.buffer.call_stack.last().copied(),
            return_value: None,
        });
        self.buffer.call_stack.push(id);
        id
    }

    pub fn record_call_exit<V: Inspect>(&mut self, id: u64, value: V) -> V {
        let stack = &mut self.buffer.call_stack;
        match stack.iter().rposition(|open| *open == id) {
            Some(at) => {
                // frames above `id` were unwound by an exception
                if at + 1 < stack.len() {
                    log::debug!("call {} exits over {} unwound frame(s)", id, stack.len() - at - 1);
                }
                stack.truncate(at);
            }
            None => log::debug!("exiting call {} is not on the call stack", id),
        }
        let rendered = self.render(&value);
        let records = &mut self.buffer.recursion;
        let position = match id.checked_sub(1).map(|i| i as usize) {
            Some(i) if records.get(i).map(|r| r.id) == Some(id) => Some(i),
            _ => records.iter().position(|r| r.id == id),
        };
        if let Some(i) = position {
            records[i].return_value = Some(rendered);
        }
        value
    }

    pub fn record_assignment<V: Inspect>(&mut self, name: &str, value: V) -> V {
        let kept = self.buffer.history.get(name).map_or(0, Vec::len);
        if kept < self.config.history_cap {
            let rendered = self.render(&value);
            self.buffer.history.entry(name.to_string()).or_default().push(rendered);
        }
        self.capture_tree(name, &value);
        value
    }

    fn capture_tree<V: Inspect>(&mut self, name: &str, value: &V) {
        let tree = render::is_tree_like(value).and_then(|is_tree| match is_tree {
            true => render::serialize_tree(value, 0, &self.config).map(Some),
            false => Ok(None),
        });
        match tree {
            Ok(Some(node)) => {
                self.buffer.trees.insert(name.to_string(), node);
            }
            Ok(None) => {}
            Err(e) => log::debug!("tree capture of {} failed: {}", name, e),
        }
    }

    /// Serialize every tree-shaped value of a scope mapping.
    pub fn capture_trees<V: Inspect>(&mut self, scope: &V) {
        match scope.entries() {
            Ok(entries) => {
                for (name, value) in entries {
                    if !name.starts_with('_') {
                        self.capture_tree(&name, &value);
                    }
                }
            }
            Err(e) => log::debug!("scope not readable for tree capture: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    /// Minimal value model for exercising the recorders.
    #[derive(Debug, Clone)]
    enum Fake {
        Int(i64),
        Str(String),
        List(Vec<Fake>),
        Scope(Vec<(String, Fake)>),
        Obj(&'static str, BTreeMap<String, Fake>),
        Broken,
        /// Counts how often it is rendered
        Counted(Rc<Cell<usize>>),
    }

    impl Inspect for Fake {
        fn kind(&self) -> ValueKind {
            match self {
                Fake::Int(i) => ValueKind::Int(*i),
                Fake::Str(s) => ValueKind::Str(s.clone()),
                Fake::List(_) => ValueKind::Sequence,
                Fake::Scope(_) => ValueKind::Mapping,
                Fake::Obj(..) | Fake::Broken => ValueKind::Object,
                Fake::Counted(_) => ValueKind::Opaque,
            }
        }

        fn type_name(&self) -> String {
            match self {
                Fake::Obj(name, _) => name.to_string(),
                _ => "fake".to_string(),
            }
        }

        fn natural_str(&self) -> Result<String, InspectError> {
            match self {
                Fake::List(items) => Ok(format!("[{}]", items.len())),
                Fake::Counted(renders) => {
                    renders.set(renders.get() + 1);
                    Ok("counted".to_string())
                }
                _ => Ok("fake".to_string()),
            }
        }

        fn attribute(&self, name: &str) -> Result<Option<Self>, InspectError> {
            match self {
                Fake::Obj(_, attrs) => Ok(attrs.get(name).cloned()),
                Fake::Broken => Err(InspectError::new("boom")),
                _ => Ok(None),
            }
        }

        fn items(&self) -> Result<Vec<Self>, InspectError> {
            match self {
                Fake::List(items) => Ok(items.clone()),
                _ => Err(InspectError::new("not a sequence")),
            }
        }

        fn lookup(&self, key: &str) -> Result<Option<Self>, InspectError> {
            Ok(self.entries()?.into_iter().find(|(k, _)| k == key).map(|(_, v)| v))
        }

        fn entries(&self) -> Result<Vec<(String, Self)>, InspectError> {
            match self {
                Fake::Scope(entries) => Ok(entries.clone()),
                _ => Err(InspectError::new("not a mapping")),
            }
        }

        fn truthy(&self) -> Result<bool, InspectError> {
            match self {
                Fake::Int(i) => Ok(*i != 0),
                Fake::Broken => Err(InspectError::new("boom")),
                _ => Ok(true),
            }
        }
    }

    fn scope(entries: &[(&str, Fake)]) -> Fake {
        Fake::Scope(entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    fn node(val: i64, left: Option<Fake>, right: Option<Fake>) -> Fake {
        let mut attrs = BTreeMap::new();
        attrs.insert("val".to_string(), Fake::Int(val));
        if let Some(left) = left {
            attrs.insert("left".to_string(), left);
        }
        if let Some(right) = right {
            attrs.insert("right".to_string(), right);
        }
        Fake::Obj("Node", attrs)
    }

    #[test]
    fn test_loop_snapshots_and_transitions() {
        let mut ctx = TraceContext::new(TraceConfig::default());
        let tracked = vec!["total".to_string()];
        ctx.record_loop(0, &scope(&[("total", Fake::Int(0))]), &tracked, Some("i"), "0..3", true);
        for (i, total) in [(0, 0), (1, 1), (2, 3)] {
            let s = scope(&[("total", Fake::Int(total)), ("i", Fake::Int(i))]);
            ctx.record_loop(0, &s, &tracked, Some("i"), "0..3", false);
        }
        // a repeated initial call is ignored
        ctx.record_loop(0, &scope(&[("total", Fake::Int(9))]), &tracked, Some("i"), "0..3", true);

        let site = &ctx.buffer().loops[&0];
        assert_eq!(site.variables, vec!["i", "total"]);
        assert_eq!(site.iterations.len(), 4);
        assert!(!site.iterations[0].values.contains_key("i"));
        assert!(site.iterations[0].exprs.is_none());
        let exprs = site.iterations[3].exprs.as_ref().unwrap();
        assert_eq!(exprs["total"], "1+2=3");
        assert!(!exprs.contains_key("i"));
    }

    #[test]
    fn test_transition_formats() {
        assert_eq!(transition(&PrevValue::Int(5), &PrevValue::Int(2)), "5-3=2");
        assert_eq!(transition(&PrevValue::Float(1.5), &PrevValue::Int(2)), "1.5+0.5=2");
        assert_eq!(
            transition(&PrevValue::Text("ab".into()), &PrevValue::Text("abc".into())),
            "ab→abc"
        );
    }

    #[test]
    fn test_call_stack_is_tolerant() {
        let mut ctx = TraceContext::new(TraceConfig::default());
        let args = scope(&[("n", Fake::Int(2)), ("_cpt_cid", Fake::Int(0))]);
        let outer = ctx.record_call_enter("f", &args);
        let inner = ctx.record_call_enter("f", &args);
        assert_eq!((outer, inner), (1, 2));
        assert_eq!(ctx.buffer().recursion[1].parent, Some(1));
        assert!(!ctx.buffer().recursion[0].args.contains_key("_cpt_cid"));

        // an id that was never opened leaves the stack alone
        ctx.record_call_exit(99, Fake::Int(0));
        assert_eq!(ctx.buffer().call_stack, vec![1, 2]);

        ctx.record_call_exit(inner, Fake::Int(1));
        ctx.record_call_exit(outer, Fake::Int(7));
        assert!(ctx.buffer().call_stack.is_empty());
        assert_eq!(ctx.buffer().recursion[0].return_value.as_deref(), Some("7"));
    }

    #[test]
    fn test_exit_below_unwound_frames_drops_them() {
        let mut ctx = TraceContext::new(TraceConfig::default());
        let args = scope(&[("n", Fake::Int(1))]);
        let safe = ctx.record_call_enter("safe", &args);
        for _ in 0..3 {
            ctx.record_call_enter("boom", &args);
        }
        // the boom frames raised; safe caught the error and returns
        ctx.record_call_exit(safe, Fake::Int(0));
        assert!(ctx.buffer().call_stack.is_empty());

        // a late exit of an unwound frame changes nothing
        ctx.record_call_exit(4, Fake::Int(0));
        assert!(ctx.buffer().call_stack.is_empty());

        let leaf = ctx.record_call_enter("leaf", &args);
        let record = &ctx.buffer().recursion[leaf as usize - 1];
        assert_eq!(record.func, "leaf");
        assert_eq!(record.parent, None);
        assert!(ctx.buffer().recursion[1..4].iter().all(|r| r.return_value.is_none()));
    }

    #[test]
    fn test_render_failures_degrade_to_placeholder() {
        let mut ctx = TraceContext::new(TraceConfig::default());
        ctx.record_assignment("x", Fake::Broken);
        assert_eq!(ctx.buffer().history["x"], vec!["?"]);
        ctx.record_condition(Fake::Broken, 0, 3, "x");
        assert_eq!(ctx.buffer().conditions[&0].values, vec!["?"]);
    }

    #[test]
    fn test_history_cap() {
        let config = TraceConfig {
            history_cap: 2,
            ..TraceConfig::default()
        };
        let mut ctx = TraceContext::new(config);
        for i in 0..5 {
            ctx.record_assignment("x", Fake::Int(i));
        }
        assert_eq!(ctx.buffer().history["x"], vec!["0", "1"]);

        let renders = Rc::new(Cell::new(0));
        ctx.record_assignment("x", Fake::Counted(renders.clone()));
        assert_eq!(renders.get(), 0);
        ctx.record_assignment("y", Fake::Counted(renders.clone()));
        assert_eq!(renders.get(), 1);
        assert_eq!(ctx.buffer().history["y"], vec!["counted"]);
    }

    #[test]
    fn test_record_truth() {
        let mut ctx = TraceContext::new(TraceConfig::default());
        ctx.record_truth(Some(true), 0, 2, "b");
        ctx.record_truth(None, 0, 2, "b");
        let site = &ctx.buffer().conditions[&0];
        assert_eq!((site.line, site.source.as_str()), (2, "b"));
        assert_eq!(site.values, vec!["True", "?"]);
    }

    #[test]
    fn test_objects_render_with_primary_field() {
        let config = TraceConfig::default();
        let list = Fake::List(vec![node(1, None, None), node(2, None, None)]);
        assert_eq!(render_value(&node(4, None, None), &config).unwrap(), "Node(4)");
        assert_eq!(render_value(&list, &config).unwrap(), "[Node(1), Node(2)]");
        assert_eq!(
            render_value(&Fake::Obj("Empty", BTreeMap::new()), &config).unwrap(),
            "Empty(...)"
        );
        assert_eq!(render_value(&Fake::Str("abc".into()), &config).unwrap(), "abc");
    }

    #[test]
    fn test_tree_capture_is_depth_capped() {
        let config = TraceConfig {
            tree_depth: 2,
            ..TraceConfig::default()
        };
        let mut ctx = TraceContext::new(config);
        let deep = node(1, Some(node(2, Some(node(3, None, None)), None)), Some(node(4, None, None)));
        ctx.record_assignment("root", deep);
        let tree = &ctx.buffer().trees["root"];
        assert_eq!(tree.val, "1");
        let left = tree.left.as_ref().unwrap();
        assert_eq!(left.val, "2");
        assert_eq!(left.left.as_ref().unwrap().val, "…");
        assert_eq!(tree.node_count(), 4);
    }
}
