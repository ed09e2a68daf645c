//! Canvas widgets with pointer interaction.

pub mod pitch_graph;
pub mod seek_bar;
