//! Read-only memory-introspection facade, ported from
//! `nosv_memory_get_used`/`nosv_memory_get_pressure` in `memory/backbone.c`.
//! Operates on the process-wide singleton set up by `backbone_init`; see
//! `lib.rs` for the free-function wrappers that match the embedding
//! contract's exact signatures (including `memory_get_size`, which answers
//! from a separately tracked size rather than through this module — see
//! `DESIGN.md`).

use crate::backbone::Backbone;
use crate::error::Status;

pub fn used(backbone: &Backbone, out: &mut usize) -> Status {
    *out = backbone.used();
    Status::Success
}

pub fn pressure(backbone: &Backbone, out: &mut f32) -> Status {
    *out = backbone.pressure();
    Status::Success
}
