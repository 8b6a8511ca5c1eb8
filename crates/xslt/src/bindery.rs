//! Variable and parameter storage for one transformation run.
//!
//! Globals live in one flat slot array with a parallel busy flag per slot. Locals live in
//! a stack of frames of uniform width, one frame per active template call; frames are
//! kept after they close and reused by the next call at the same depth.

use crate::error::XsltError;
use std::collections::HashMap;
use weft_tree::NameId;
use weft_xpath::{Binding, XPathValue};

/// Parameter values supplied by a caller, by expanded name.
pub type ParameterSet = HashMap<NameId, XPathValue>;

#[derive(Debug, Default)]
struct Frame {
    slots: Vec<Option<XPathValue>>,
    params: ParameterSet,
}

#[derive(Debug)]
pub struct Bindery {
    globals: Vec<Option<XPathValue>>,
    busy: Vec<bool>,
    frames: Vec<Frame>,
    depth: usize,
    width: usize,
}

impl Bindery {
    /// `width` is the largest number of local slots any template needs.
    pub fn new(width: usize) -> Self {
        Self {
            globals: Vec::new(),
            busy: Vec::new(),
            frames: Vec::new(),
            depth: 0,
            width,
        }
    }

    pub fn allocate_globals(&mut self, count: usize) {
        self.globals = vec![None; count];
        self.busy = vec![false; count];
    }

    pub fn open_frame(&mut self, params: ParameterSet) {
        if let Some(frame) = self.frames.get_mut(self.depth) {
            frame.slots.iter_mut().for_each(|slot| *slot = None);
            frame.params = params;
        } else {
            self.frames.push(Frame {
                slots: vec![None; self.width],
                params,
            });
        }
        self.depth += 1;
    }

    pub fn close_frame(&mut self) {
        if self.depth > 0 {
            self.depth -= 1;
            if let Some(frame) = self.frames.get_mut(self.depth) {
                frame.params.clear();
            }
        }
    }

    /// The number of open frames.
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn current_frame(&mut self) -> Option<&mut Frame> {
        let depth = self.depth;
        if depth == 0 {
            return None;
        }
        self.frames.get_mut(depth - 1)
    }

    pub fn get(&self, binding: &Binding) -> Option<&XPathValue> {
        if binding.is_global() {
            return self.globals.get(binding.slot)?.as_ref();
        }
        let frame = self.frames.get(self.depth.checked_sub(1)?)?;
        frame.slots.get(binding.slot)?.as_ref()
    }

    pub fn define(&mut self, binding: &Binding, value: XPathValue) {
        let slots = if binding.is_global() {
            &mut self.globals
        } else {
            match self.current_frame() {
                Some(frame) => &mut frame.slots,
                None => return,
            }
        };
        if binding.slot >= slots.len() {
            slots.resize(binding.slot + 1, None);
        }
        slots[binding.slot] = Some(value);
    }

    /// Replaces the value of a variable declared assignable.
    pub fn assign(&mut self, binding: &Binding, value: XPathValue) -> Result<(), XsltError> {
        if !binding.assignable {
            return Err(XsltError::Execution(format!(
                "variable in slot {} is not assignable",
                binding.slot
            )));
        }
        if self.get(binding).is_none() {
            return Err(XsltError::Execution(format!(
                "variable in slot {} is assigned before it is defined",
                binding.slot
            )));
        }
        self.define(binding, value);
        Ok(())
    }

    /// Flags a global as under evaluation. Finding it already flagged means its definition
    /// depends on itself.
    pub fn mark_busy(&mut self, binding: &Binding, name: &str) -> Result<(), XsltError> {
        if self.busy.len() <= binding.slot {
            self.busy.resize(binding.slot + 1, false);
        }
        if self.busy[binding.slot] {
            return Err(XsltError::CircularDefinition {
                what: format!("variable ${}", name),
            });
        }
        self.busy[binding.slot] = true;
        Ok(())
    }

    pub fn clear_busy(&mut self, binding: &Binding) {
        if let Some(flag) = self.busy.get_mut(binding.slot) {
            *flag = false;
        }
    }

    /// Binds a template parameter from the values the caller supplied. Returns `false`
    /// when no value was supplied, so the default must be evaluated.
    pub fn use_local_parameter(&mut self, name: NameId, binding: &Binding) -> bool {
        let Some(frame) = self.current_frame() else {
            return false;
        };
        let Some(value) = frame.params.remove(&name) else {
            return false;
        };
        self.define(binding, value);
        true
    }

    /// As [`Bindery::use_local_parameter`], for a stylesheet parameter and the values
    /// given to the run.
    pub fn use_global_parameter(
        &mut self,
        name: NameId,
        binding: &Binding,
        params: &ParameterSet,
    ) -> bool {
        match params.get(&name) {
            Some(value) => {
                self.define(binding, value.clone());
                true
            }
            None => false,
        }
    }
}
