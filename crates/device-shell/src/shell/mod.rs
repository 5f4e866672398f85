//! The three shell stages: trim, inner wall and outer wall.

mod trim;
mod wall;

pub use trim::{map_curve_to_surface, trim_seed_point, trim_shell};
pub use wall::{extrude_wall, flare_falloff, flare_offsets, inner_wall};

/// Triangle groups assigned by the shell stages.
///
/// Groups allocated later (connector parts, seams, hole fans) come after
/// [`STITCH`](shell_groups::STITCH).
pub mod shell_groups {
    /// Everything in the trimmed scan.
    pub const TRIMMED: i32 = 0;
    /// The wall facing the limb after extrusion.
    pub const INNER: i32 = 1;
    /// The offset copy facing outward.
    pub const OUTER: i32 = 2;
    /// The strip closing the rim between inner and outer.
    pub const STITCH: i32 = 3;
}
