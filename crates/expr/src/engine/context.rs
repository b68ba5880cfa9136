//! Dynamic evaluation context.
//!
//! An [`EvalContext`] is cheap to clone: the per-evaluation state shared by
//! all contexts lives behind one `Rc`, the stack frame is copy-on-write, and
//! the focus is a small `Rc`. A *minor* context only replaces the focus and
//! shares the frame of its parent; a *major* context (user function call,
//! global variable) starts a fresh frame and links to its caller.

use chrono::{DateTime, FixedOffset, Local};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::compiler::package::Package;
use crate::engine::iter::{SeqIter, count};
use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::engine::value::Value;
use crate::model::XdmNode;
use crate::xdm::{ExpandedName, XdmItem};

pub(crate) enum GlobalState<N> {
    Unevaluated,
    Evaluating,
    Ready(Rc<[XdmItem<N>]>),
}

pub(crate) struct Shared<'a, N> {
    pub package: &'a Package,
    pub dynamic: &'a DynamicContext<N>,
    /// Fixed for the whole evaluation.
    pub now: DateTime<FixedOffset>,
    pub globals: RefCell<Vec<GlobalState<N>>>,
}

/// Source of `last()` for a focus.
pub(crate) struct SizeProbe<'a, N> {
    known: Cell<Option<usize>>,
    /// Independent cursor over the focus sequence, counted on first demand.
    seed: RefCell<Option<SeqIter<'a, N>>>,
}

impl<'a, N> SizeProbe<'a, N> {
    pub(crate) fn known(size: usize) -> Rc<Self> {
        Rc::new(Self { known: Cell::new(Some(size)), seed: RefCell::new(None) })
    }

    /// For foci whose consumers never ask for `last()`.
    pub(crate) fn unknown() -> Rc<Self> {
        Rc::new(Self { known: Cell::new(None), seed: RefCell::new(None) })
    }

    pub(crate) fn lazy(seed: SeqIter<'a, N>) -> Rc<Self> {
        let known = seed.length();
        Rc::new(Self { known: Cell::new(known), seed: RefCell::new(Some(seed)) })
    }

    fn get(&self) -> Result<usize, Error> {
        if let Some(n) = self.known.get() {
            return Ok(n);
        }
        let Some(mut seed) = self.seed.borrow_mut().take() else {
            return Err(Error::from_code(ErrorCode::XPDY0002, "context size is not available"));
        };
        let n = count(&mut seed)?;
        self.known.set(Some(n));
        Ok(n)
    }
}

pub(crate) struct Focus<'a, N> {
    pub item: XdmItem<N>,
    pub position: usize,
    pub size: Rc<SizeProbe<'a, N>>,
}

pub(crate) struct CallFrame {
    pub name: ExpandedName,
    pub depth: usize,
    pub parent: Option<Rc<CallFrame>>,
}

pub(crate) struct EvalContext<'a, N> {
    pub shared: Rc<Shared<'a, N>>,
    frame: Rc<Vec<Value<'a, N>>>,
    focus: Option<Rc<Focus<'a, N>>>,
    caller: Option<Rc<CallFrame>>,
}

impl<N> Clone for EvalContext<'_, N> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            frame: self.frame.clone(),
            focus: self.focus.clone(),
            caller: self.caller.clone(),
        }
    }
}

impl<'a, N: XdmNode> EvalContext<'a, N> {
    /// Top-level context: the focus is the supplied context item, if any.
    pub(crate) fn new(package: &'a Package, dynamic: &'a DynamicContext<N>, frame_size: usize) -> Self {
        let now = dynamic.now.unwrap_or_else(|| Local::now().fixed_offset());
        let globals = package.globals().iter().map(|_| GlobalState::Unevaluated).collect();
        let shared = Rc::new(Shared { package, dynamic, now, globals: RefCell::new(globals) });
        let focus = dynamic
            .context_item
            .clone()
            .map(|item| Rc::new(Focus { item, position: 1, size: SizeProbe::known(1) }));
        Self { shared, frame: Rc::new(vec![Value::Unset; frame_size]), focus, caller: None }
    }

    /// Same frame, new focus.
    pub(crate) fn minor(&self, item: XdmItem<N>, position: usize, size: Rc<SizeProbe<'a, N>>) -> Self {
        Self {
            shared: self.shared.clone(),
            frame: self.frame.clone(),
            focus: Some(Rc::new(Focus { item, position, size })),
            caller: self.caller.clone(),
        }
    }

    /// Fresh frame and no focus, recording `name` as the callee.
    pub(crate) fn major(&self, frame_size: usize, name: &ExpandedName) -> Result<Self, Error> {
        let depth = self.caller.as_ref().map_or(0, |c| c.depth) + 1;
        if depth > self.shared.dynamic.max_call_depth {
            let chain = self.call_stack().iter().take(3).map(ToString::to_string).collect::<Vec<_>>().join(" <- ");
            return Err(Error::from_code(
                ErrorCode::SXLM0001,
                format!("too many nested function calls: {name} called at depth {depth} from {chain}"),
            ));
        }
        Ok(Self {
            shared: self.shared.clone(),
            frame: Rc::new(vec![Value::Unset; frame_size]),
            focus: None,
            caller: Some(Rc::new(CallFrame { name: name.clone(), depth, parent: self.caller.clone() })),
        })
    }

    /// Context for evaluating a global variable: fresh frame, the global
    /// context item as focus.
    pub(crate) fn for_global(&self, frame_size: usize) -> Self {
        let focus = self
            .shared
            .dynamic
            .context_item
            .clone()
            .map(|item| Rc::new(Focus { item, position: 1, size: SizeProbe::known(1) }));
        Self { shared: self.shared.clone(), frame: Rc::new(vec![Value::Unset; frame_size]), focus, caller: None }
    }

    pub(crate) fn set_local(&mut self, slot: usize, value: Value<'a, N>) -> Result<(), Error> {
        let frame = Rc::make_mut(&mut self.frame);
        let Some(cell) = frame.get_mut(slot) else {
            return Err(Error::from_code(ErrorCode::XPST0008, format!("no stack frame slot {slot}")));
        };
        *cell = value;
        Ok(())
    }

    pub(crate) fn local(&self, slot: usize) -> Result<&Value<'a, N>, Error> {
        self.frame
            .get(slot)
            .ok_or_else(|| Error::from_code(ErrorCode::XPST0008, format!("no stack frame slot {slot}")))
    }

    pub(crate) fn focus(&self) -> Option<&Focus<'a, N>> {
        self.focus.as_deref()
    }

    pub(crate) fn context_item(&self) -> Result<&XdmItem<N>, Error> {
        self.focus
            .as_ref()
            .map(|f| &f.item)
            .ok_or_else(|| Error::from_code(ErrorCode::XPDY0002, "context item is absent"))
    }

    pub(crate) fn context_node(&self) -> Result<&N, Error> {
        match self.context_item()? {
            XdmItem::Node(n) => Ok(n),
            XdmItem::Atomic(_) => {
                Err(Error::from_code(ErrorCode::XPTY0020, "context item for an axis step is not a node"))
            }
        }
    }

    pub(crate) fn position(&self) -> Result<usize, Error> {
        self.focus.as_ref().map(|f| f.position).ok_or_else(|| Error::from_code(ErrorCode::XPDY0002, "focus is absent"))
    }

    pub(crate) fn last(&self) -> Result<usize, Error> {
        match &self.focus {
            Some(f) => f.size.get(),
            None => Err(Error::from_code(ErrorCode::XPDY0002, "focus is absent")),
        }
    }

    /// Names of the active user function calls, innermost first.
    pub(crate) fn call_stack(&self) -> Vec<ExpandedName> {
        let mut out = Vec::new();
        let mut frame = self.caller.as_deref();
        while let Some(f) = frame {
            out.push(f.name.clone());
            frame = f.parent.as_deref();
        }
        out
    }
}
