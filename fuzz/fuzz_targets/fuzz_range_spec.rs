// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for range-spec JSON parsing in the plan builder

#![no_main]

use libfuzzer_sys::fuzz_target;
use refract_ast::{Node, NodeKind, Tree};
use refract_links::{FieldType, IndexDef, StaticMetadata};
use refract_plan::PlanBuilder;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as a range spec must error cleanly, never panic
    if let Ok(spec) = std::str::from_utf8(data) {
        let metadata = StaticMetadata::new(
            IndexDef::new("db.public.posts.idx_posts", "id")
                .with_field("score", FieldType::Integer),
        );
        let mut tree = Tree::new();
        let range = tree.add(
            Node::new(NodeKind::Range {
                spec: spec.to_string(),
            })
            .with_field("score"),
        );
        let builder = PlanBuilder::new(&metadata);
        let _ = builder.build(&mut tree, range);
    }
});
