// Copyright (C) 2024 GLStudios
// SPDX-License-Identifier: LGPL-2.1-only

use crate::{
    registry::ObjectRegistry,
    types::ObjectId,
};

/// Exact test run on pairs the broad phase could not rule out.
pub trait NarrowPhase {
    fn colliding(
        &self,
        a: ObjectId,
        b: ObjectId,
    ) -> bool;
}

impl<F> NarrowPhase for F
where
    F: Fn(ObjectId, ObjectId) -> bool,
{
    fn colliding(
        &self,
        a: ObjectId,
        b: ObjectId,
    ) -> bool {
        self(a, b)
    }
}

/// Treats the registry's boxes as the exact shapes. Unknown ids never collide.
#[derive(Clone, Copy, Debug)]
pub struct AabbOverlap<'a, R: ?Sized>(pub &'a R);

impl<R: ObjectRegistry + ?Sized> NarrowPhase for AabbOverlap<'_, R> {
    fn colliding(
        &self,
        a: ObjectId,
        b: ObjectId,
    ) -> bool {
        let (Some(a), Some(b)) = (self.0.bounds(a), self.0.bounds(b)) else {
            return false;
        };
        a.overlaps(&b)
    }
}

/// Every pair from `ids` that `narrow` confirms, without any culling.
#[must_use]
pub fn exhaustive_pairs<N: NarrowPhase + ?Sized>(
    ids: &[ObjectId],
    narrow: &N,
) -> Vec<(ObjectId, ObjectId)> {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut pairs = Vec::new();
    for (i, a) in sorted.iter().enumerate() {
        for b in &sorted[i + 1..] {
            if narrow.colliding(*a, *b) {
                pairs.push((*a, *b));
            }
        }
    }
    pairs
}
