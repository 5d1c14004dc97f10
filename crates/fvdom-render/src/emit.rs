#![forbid(unsafe_code)]

//! Component events.
//!
//! `emit("value-change", args)` looks for a listener prop on the component's
//! current vnode, trying in order `onValue-change`, `onValueChange`, and the
//! hyphenated form. A listener registered as `on{Event}Once` fires at most
//! once per instance.
//!
//! Emitting never fails the caller. Handler errors are reported to the
//! renderer and routed through the owner's error-captured chain on the next
//! flush; declaration problems become warnings.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use ahash::AHashSet;

use crate::arena::InstanceId;
use crate::component::ComponentDef;
use crate::config::Diagnostics;
use crate::error::{ErrorOrigin, Warning};
use crate::scene::{PropValue, Props};

/// `foo-bar` to `fooBar`.
#[must_use]
pub fn camelize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    if upper {
        out.push('-');
    }
    out
}

/// `fooBar` to `foo-bar`.
#[must_use]
pub fn hyphenate(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            out.push('-');
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// `click` to `onClick`.
#[must_use]
pub fn handler_key(event: &str) -> String {
    let mut chars = event.chars();
    let mut out = String::with_capacity(event.len() + 2);
    out.push_str("on");
    if let Some(first) = chars.next() {
        out.extend(first.to_uppercase());
        out.push_str(chars.as_str());
    }
    out
}

struct EmitState {
    owner: InstanceId,
    component: ComponentDef,
    props: RefCell<Props>,
    fired_once: RefCell<AHashSet<String>>,
    unmounted: Cell<bool>,
    diagnostics: Rc<Diagnostics>,
}

/// Emits events to the listeners a parent passed as props.
#[derive(Clone)]
pub struct Emitter {
    state: Rc<EmitState>,
}

impl Emitter {
    pub(crate) fn new(
        owner: InstanceId,
        component: ComponentDef,
        props: Props,
        diagnostics: Rc<Diagnostics>,
    ) -> Self {
        Self {
            state: Rc::new(EmitState {
                owner,
                component,
                props: RefCell::new(props),
                fired_once: RefCell::new(AHashSet::new()),
                unmounted: Cell::new(false),
                diagnostics,
            }),
        }
    }

    /// Track the listeners of the instance's latest vnode.
    pub(crate) fn set_props(&self, props: Props) {
        *self.state.props.borrow_mut() = props;
    }

    pub(crate) fn mark_unmounted(&self) {
        self.state.unmounted.set(true);
    }

    /// Whether `key` is the listener prop of a declared event.
    pub(crate) fn is_declared_listener(&self, key: &str) -> bool {
        let Some(emits) = self.state.component.emits() else {
            return false;
        };
        let Some(event) = key.strip_prefix("on") else {
            return false;
        };
        let event = event.strip_suffix("Once").unwrap_or(event);
        emits.iter().any(|decl| {
            let camel = camelize(&decl.name);
            handler_key(&camel) == format!("on{event}")
                || handler_key(&decl.name) == format!("on{event}")
        })
    }

    /// Emit `event` with `args`.
    pub fn emit(&self, event: &str, args: &[PropValue]) {
        let state = &self.state;
        if state.unmounted.get() {
            return;
        }
        self.check_declaration(event, args);

        let props = state.props.borrow().clone();
        let candidates = [
            handler_key(event),
            handler_key(&camelize(event)),
            handler_key(&hyphenate(event)),
        ];
        let handler = candidates
            .iter()
            .find_map(|key| props.get(key).and_then(PropValue::as_handler).map(|h| (key, h.clone())));
        if let Some((_, handler)) = &handler
            && let Err(error) = handler.call(args)
        {
            state
                .diagnostics
                .report(Some(state.owner), error, ErrorOrigin::EventHandler);
        }

        let once_key = match &handler {
            Some((key, _)) => format!("{key}Once"),
            None => format!("{}Once", candidates[0]),
        };
        if let Some(once) = props.get(&once_key).and_then(PropValue::as_handler) {
            if !state.fired_once.borrow_mut().insert(once_key) {
                return;
            }
            if let Err(error) = once.call(args) {
                state
                    .diagnostics
                    .report(Some(state.owner), error, ErrorOrigin::EventHandler);
            }
        }
    }

    fn check_declaration(&self, event: &str, args: &[PropValue]) {
        let state = &self.state;
        let Some(emits) = state.component.emits() else {
            return;
        };
        let camel = camelize(event);
        let decl = emits.iter().find(|d| d.name.as_ref() == event || *d.name == *camel);
        match decl {
            None => {
                if !state.component.declares_prop(&handler_key(&camel)) {
                    state.diagnostics.warn(Warning::UndeclaredEmit {
                        component: state.component.name().into(),
                        event: event.into(),
                    });
                }
            }
            Some(decl) => {
                if let Some(validator) = &decl.validator
                    && !validator(args)
                {
                    state.diagnostics.warn(Warning::InvalidEmitArguments {
                        component: state.component.name().into(),
                        event: event.into(),
                    });
                }
            }
        }
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("component", &self.state.component.name())
            .field("unmounted", &self.state.unmounted.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::component::{ComponentDef, LifecycleState};
    use crate::scene::{Handler, SceneNode};

    fn owner() -> InstanceId {
        let mut arena: Arena<crate::arena::InstanceMarker, LifecycleState> = Arena::new();
        arena.insert(LifecycleState::Mounted)
    }

    fn counting_handler() -> (Rc<RefCell<Vec<PropValue>>>, Handler) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let handler = Handler::infallible(move |args| s.borrow_mut().extend(args.iter().cloned()));
        (seen, handler)
    }

    fn emitter(def: ComponentDef, props: Props) -> (Emitter, Rc<Diagnostics>) {
        let diag = Rc::new(Diagnostics::default());
        (Emitter::new(owner(), def, props, Rc::clone(&diag)), diag)
    }

    fn def() -> ComponentDef {
        ComponentDef::functional("Child", |_| Ok(SceneNode::comment("")))
    }

    #[test]
    fn name_transforms() {
        assert_eq!(camelize("value-change"), "valueChange");
        assert_eq!(hyphenate("valueChange"), "value-change");
        assert_eq!(handler_key("click"), "onClick");
        assert_eq!(handler_key(""), "on");
    }

    #[test]
    fn kebab_event_reaches_camel_listener() {
        let (seen, handler) = counting_handler();
        let (emitter, _) = emitter(def(), Props::new().with("onValueChange", handler));
        emitter.emit("value-change", &[PropValue::Int(3)]);
        assert_eq!(*seen.borrow(), vec![PropValue::Int(3)]);
    }

    #[test]
    fn once_listener_fires_once() {
        let (seen, handler) = counting_handler();
        let (emitter, _) = emitter(def(), Props::new().with("onSaveOnce", handler));
        emitter.emit("save", &[PropValue::Int(1)]);
        emitter.emit("save", &[PropValue::Int(2)]);
        assert_eq!(*seen.borrow(), vec![PropValue::Int(1)]);
    }

    #[test]
    fn undeclared_event_warns() {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let (emitter, diag) = emitter(def().with_emits(["save"]), Props::new());
        let w = Rc::clone(&warnings);
        diag.set_warn_handler(Some(Rc::new(move |warning: &Warning| {
            w.borrow_mut().push(warning.clone());
        })));
        emitter.emit("save", &[]);
        emitter.emit("close", &[]);
        assert_eq!(warnings.borrow().len(), 1);
        assert!(matches!(&warnings.borrow()[0], Warning::UndeclaredEmit { event, .. } if &**event == "close"));
    }

    #[test]
    fn failing_validator_warns_but_still_calls() {
        let (seen, handler) = counting_handler();
        let d = def().with_emit_validator("pick", |args| !args.is_empty());
        let (emitter, diag) = emitter(d, Props::new().with("onPick", handler));
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        diag.set_warn_handler(Some(Rc::new(move |_: &Warning| h.set(h.get() + 1))));
        emitter.emit("pick", &[]);
        assert_eq!(hits.get(), 1);
        assert!(seen.borrow().is_empty());
        emitter.emit("pick", &[PropValue::Bool(true)]);
        assert_eq!(hits.get(), 1);
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn handler_errors_are_reported() {
        let failing = Handler::new(|_| Err("nope".into()));
        let (emitter, diag) = emitter(def(), Props::new().with("onGo", failing));
        emitter.emit("go", &[]);
        let reported = diag.take_reported();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].origin, ErrorOrigin::EventHandler);
    }

    #[test]
    fn unmounted_emitter_is_silent() {
        let (seen, handler) = counting_handler();
        let (emitter, _) = emitter(def(), Props::new().with("onGo", handler));
        emitter.mark_unmounted();
        emitter.emit("go", &[PropValue::Null]);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn declared_listener_detection() {
        let (emitter, _) = emitter(def().with_emits(["update-value"]), Props::new());
        assert!(emitter.is_declared_listener("onUpdateValue"));
        assert!(emitter.is_declared_listener("onUpdateValueOnce"));
        assert!(!emitter.is_declared_listener("onClick"));
        assert!(!emitter.is_declared_listener("title"));
    }
}
