//! Positions module - extracted, normalized and resolved holdings.

mod positions_model;


pub use positions_model::{
    AccountPositions, BatchResolution, CashLine, DropReason, DroppedPosition, ExtractedPosition,
    MatchKind, NormalizedPosition, PositionHints, ReferenceProvenance, ResolutionCounts,
    ResolvedAccount, ResolvedPosition,
};
