//! Startup enumeration of already-attached devices.

use std::io;

use devpub_core::DeviceName;
use tracing::{debug, warn};

use crate::source::DeviceTree;

/// Walk the tree below `root` (`None` for the tree root).
///
/// Every node's children are reported together, in query order, before the
/// walk descends into them, so a parent always precedes its descendants.
/// A failed query abandons that node's subtree only.
pub fn probe<T>(tree: &mut T, root: Option<&DeviceName>) -> Vec<DeviceName>
where
    T: DeviceTree + ?Sized,
{
    let mut found = Vec::new();
    walk(tree, root, &mut found);
    found
}

fn walk<T>(tree: &mut T, device: Option<&DeviceName>, found: &mut Vec<DeviceName>)
where
    T: DeviceTree + ?Sized,
{
    let children = match children_of(tree, device) {
        Ok(children) => children,
        Err(err) => {
            warn!(device = %display_name(device), error = %err, "device tree query failed");
            return;
        }
    };

    found.extend(children.iter().cloned());
    for child in &children {
        walk(tree, Some(child), found);
    }
}

/// Count, then list. If the tree changed in between, list again with the
/// newer count until both calls agree.
fn children_of<T>(tree: &mut T, device: Option<&DeviceName>) -> io::Result<Vec<DeviceName>>
where
    T: DeviceTree + ?Sized,
{
    let mut expected = tree.child_count(device)?;
    loop {
        if expected == 0 {
            return Ok(Vec::new());
        }
        let listing = tree.list_children(device, expected)?;
        if listing.count == expected {
            return Ok(listing.names);
        }
        debug!(
            device = %display_name(device),
            expected,
            reported = listing.count,
            "child count changed while probing, retrying"
        );
        expected = listing.count;
    }
}

fn display_name(device: Option<&DeviceName>) -> &str {
    device.map_or("<root>", DeviceName::as_str)
}
