// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Host bridge discovery from the platform device tree.

/// Nodes deeper than this below the root are not visited.
pub const MAX_HIERARCHY_DEPTH: usize = 64;

/// A platform device tree that can be searched for PCI host bridges.
pub trait DeviceHierarchy: Send + Sync {
    /// A handle to one node in the tree.
    type Node;

    /// Returns the root of the tree.
    fn root(&self) -> anyhow::Result<Self::Node>;

    /// Returns the direct children of `node`.
    fn children(&self, node: &Self::Node) -> anyhow::Result<Vec<Self::Node>>;

    /// Whether `node` is a PCI host bridge.
    fn is_pci_bridge(&self, node: &Self::Node) -> bool;
}

/// A source of the number of PCI host bridges, and so of PCI domains.
pub trait HostBridgeSource: Send + Sync {
    /// Walks the platform and counts its host bridges.
    fn count_host_bridges(&self) -> u32;
}

impl<T: DeviceHierarchy> HostBridgeSource for T {
    fn count_host_bridges(&self) -> u32 {
        count_host_bridges(self)
    }
}

/// Counts the bridges in `hierarchy` depth first.
///
/// A bridge is counted and not descended into, since any bridges below it
/// belong to its own domain. Nodes that cannot be listed are skipped.
pub fn count_host_bridges<H: DeviceHierarchy + ?Sized>(hierarchy: &H) -> u32 {
    let root = match hierarchy.root() {
        Ok(root) => root,
        Err(err) => {
            tracing::warn!(
                error = err.as_ref() as &dyn std::error::Error,
                "failed to open device hierarchy root"
            );
            return 0;
        }
    };

    let mut count = 0;
    let mut truncated = false;
    let mut stack = vec![(root, 0)];
    while let Some((node, depth)) = stack.pop() {
        if hierarchy.is_pci_bridge(&node) {
            count += 1;
            continue;
        }
        if depth == MAX_HIERARCHY_DEPTH {
            truncated = true;
            continue;
        }
        match hierarchy.children(&node) {
            Ok(children) => stack.extend(children.into_iter().rev().map(|c| (c, depth + 1))),
            Err(err) => {
                tracing::warn!(
                    depth,
                    error = err.as_ref() as &dyn std::error::Error,
                    "failed to list device hierarchy children"
                );
            }
        }
    }

    if truncated {
        tracing::warn!(
            max_depth = MAX_HIERARCHY_DEPTH,
            "device hierarchy deeper than supported, ignoring deeper nodes"
        );
    }
    tracing::debug!(count, "counted PCI host bridges");
    count
}
