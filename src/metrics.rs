//! Basic operation counters (SPEC_FULL.md §4.9): plain counters a caller
//! bumps at decision points, with a cheap text report for the admin CLI's
//! `stats` command.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ServiceMetrics {
    pub objects_begun: AtomicU64,
    pub objects_committed: AtomicU64,
    pub objects_deleted: AtomicU64,
    pub segments_committed: AtomicU64,
    pub copies_finished: AtomicU64,
    pub piece_deletion_rounds: AtomicU64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print_report(&self) {
        println!("\n=== Metabase Service Metrics ===");
        println!("Objects begun:        {}", self.objects_begun.load(Ordering::Relaxed));
        println!("Objects committed:    {}", self.objects_committed.load(Ordering::Relaxed));
        println!("Objects deleted:      {}", self.objects_deleted.load(Ordering::Relaxed));
        println!("Segments committed:   {}", self.segments_committed.load(Ordering::Relaxed));
        println!("Copies finished:      {}", self.copies_finished.load(Ordering::Relaxed));
        println!("Piece-deletion rounds: {}", self.piece_deletion_rounds.load(Ordering::Relaxed));
    }
}
