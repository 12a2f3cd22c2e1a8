// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::AccessError;
use crate::BusProbeFailed;
use crate::IoReturn;
use crate::OpenError;
use crate::PciAddress;
use crate::TransferWidth;
use crate::channel::ServiceProvider;
use crate::channel::TransactionChannel;
use crate::enumerate::BusMap;
use crate::enumerate::BusProbe;
use crate::hierarchy::DeviceHierarchy;
use crate::strategy::BoundStrategy;
use crate::strategy::StrategyKind;
use parking_lot::Mutex;
use pci_host_defs::PciConfigAddress;
use pci_host_defs::acpi;
use pci_host_defs::diagnostics;
use pci_host_defs::direct_hw;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use tracing::metadata::LevelFilter;
use zerocopy::FromBytes;
use zerocopy::IntoBytes;

pub fn init_tracing() {
    static ONCE: std::sync::Once = std::sync::Once::new();

    ONCE.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_test_writer()
            .with_max_level(LevelFilter::TRACE)
            .try_init();
    });
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub write: bool,
    pub address: PciAddress,
    pub width: TransferWidth,
}

#[derive(Default)]
struct SpaceState {
    functions: HashMap<PciAddress, HashMap<u16, u8>>,
    transactions: Vec<Transaction>,
    fail_reads: Option<IoReturn>,
    fail_writes: Option<IoReturn>,
    fail_registers: HashSet<PciAddress>,
}

/// Sparse configuration space shared by every channel created from it.
///
/// Absent functions read as all ones, present ones default to zero.
#[derive(Clone, Default)]
pub struct MockConfigSpace {
    state: Arc<Mutex<SpaceState>>,
}

impl MockConfigSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&self, address: PciAddress) {
        self.state
            .lock()
            .functions
            .entry(address.with_register(0))
            .or_default();
    }

    pub fn set_byte(&self, address: PciAddress, value: u8) {
        let mut state = self.state.lock();
        let regs = state
            .functions
            .get_mut(&address.with_register(0))
            .expect("function not present");
        regs.insert(address.register(), value);
    }

    pub fn set_dword(&self, address: PciAddress, value: u32) {
        for (i, b) in value.to_le_bytes().into_iter().enumerate() {
            self.set_byte(address.checked_add(i as u16).unwrap(), b);
        }
    }

    pub fn fail_reads(&self, status: Option<IoReturn>) {
        self.state.lock().fail_reads = status;
    }

    pub fn fail_writes(&self, status: Option<IoReturn>) {
        self.state.lock().fail_writes = status;
    }

    /// Fails any transaction starting at `address`.
    pub fn fail_register(&self, address: PciAddress) {
        self.state.lock().fail_registers.insert(address);
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.state.lock().transactions.clone()
    }

    pub fn channel(&self, kind: StrategyKind) -> MockChannel {
        MockChannel {
            kind,
            space: self.clone(),
        }
    }

    fn read(&self, address: PciAddress, width: TransferWidth) -> Result<u32, IoReturn> {
        let mut state = self.state.lock();
        state.transactions.push(Transaction {
            write: false,
            address,
            width,
        });
        if let Some(status) = state.fail_reads {
            return Err(status);
        }
        if state.fail_registers.contains(&address) {
            return Err(IoReturn::IO_ERROR);
        }
        let Some(regs) = state.functions.get(&address.with_register(0)) else {
            return Ok(width.mask());
        };
        let mut bytes = [0; 4];
        for (i, b) in bytes[..width.bytes()].iter_mut().enumerate() {
            *b = regs
                .get(&(address.register() + i as u16))
                .copied()
                .unwrap_or(0);
        }
        Ok(u32::from_le_bytes(bytes))
    }

    fn write(&self, address: PciAddress, width: TransferWidth, value: u32) -> Result<(), IoReturn> {
        let mut state = self.state.lock();
        state.transactions.push(Transaction {
            write: true,
            address,
            width,
        });
        if let Some(status) = state.fail_writes {
            return Err(status);
        }
        if state.fail_registers.contains(&address) {
            return Err(IoReturn::IO_ERROR);
        }
        if let Some(regs) = state.functions.get_mut(&address.with_register(0)) {
            for (i, b) in value.to_le_bytes()[..width.bytes()].iter().enumerate() {
                regs.insert(address.register() + i as u16, *b);
            }
        }
        Ok(())
    }
}

fn decode(
    address: PciConfigAddress,
    bit_width: u32,
) -> Result<(PciAddress, TransferWidth), IoReturn> {
    let pci = PciAddress::new(
        address.segment(),
        address.bus(),
        address.device(),
        address.function(),
        address.offset(),
    )
    .map_err(|_| IoReturn::BAD_ARGUMENT)?;
    let width =
        TransferWidth::from_len(bit_width as usize / 8).map_err(|_| IoReturn::BAD_ARGUMENT)?;
    Ok((pci, width))
}

/// A channel that decodes the wire block of one service, rejecting calls
/// that do not match its method table or buffer conventions.
pub struct MockChannel {
    kind: StrategyKind,
    space: MockConfigSpace,
}

impl MockChannel {
    fn acpi_call(&self, method: u32, input: &[u8], output: &mut [u8]) -> Result<(), IoReturn> {
        let request =
            acpi::AddressSpaceRequest::read_from_bytes(input).map_err(|_| IoReturn::BAD_ARGUMENT)?;
        let space_id = request.space_id;
        let value = request.value;
        if space_id != acpi::space_id::PCI_CONFIGURATION {
            return Err(IoReturn::BAD_ARGUMENT);
        }
        let (address, width) = decode(request.address, request.bit_width)?;
        match method {
            acpi::method::ADDRESS_SPACE_READ => {
                if value != !0 || output.len() != input.len() {
                    return Err(IoReturn::BAD_ARGUMENT);
                }
                let mut response = request;
                response.value = self.space.read(address, width)?.into();
                output.copy_from_slice(response.as_bytes());
                Ok(())
            }
            acpi::method::ADDRESS_SPACE_WRITE => {
                if !output.is_empty() {
                    return Err(IoReturn::BAD_ARGUMENT);
                }
                self.space.write(address, width, value as u32)
            }
            _ => Err(IoReturn::UNSUPPORTED),
        }
    }

    fn pci_call(
        &self,
        (read, write): (u32, u32),
        echo_writes: bool,
        method: u32,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<(), IoReturn> {
        let request = diagnostics::DiagnosticsRequest::read_from_bytes(input)
            .map_err(|_| IoReturn::BAD_ARGUMENT)?;
        if request.space_type != diagnostics::space_type::CONFIG {
            return Err(IoReturn::BAD_ARGUMENT);
        }
        let (address, width) = decode(request.address, request.bit_width)?;
        if method == read {
            if request.value != !0 || output.len() != input.len() {
                return Err(IoReturn::BAD_ARGUMENT);
            }
            let mut response = request;
            response.value = self.space.read(address, width)?.into();
            output.copy_from_slice(response.as_bytes());
            Ok(())
        } else if method == write {
            let expected = if echo_writes { input.len() } else { 0 };
            if output.len() != expected {
                return Err(IoReturn::BAD_ARGUMENT);
            }
            self.space.write(address, width, request.value as u32)?;
            output.copy_from_slice(&input[..expected]);
            Ok(())
        } else {
            Err(IoReturn::UNSUPPORTED)
        }
    }
}

impl TransactionChannel for MockChannel {
    fn call(&self, method: u32, input: &[u8], output: &mut [u8]) -> Result<(), IoReturn> {
        match self.kind {
            StrategyKind::AcpiPlatform => self.acpi_call(method, input, output),
            StrategyKind::PciDiagnostics => self.pci_call(
                (diagnostics::method::READ, diagnostics::method::WRITE),
                false,
                method,
                input,
                output,
            ),
            StrategyKind::DirectHw => self.pci_call(
                (direct_hw::method::READ, direct_hw::method::WRITE),
                true,
                method,
                input,
                output,
            ),
        }
    }
}

enum MockService {
    Available(MockConfigSpace),
    Refuses(IoReturn),
}

#[derive(Default)]
pub struct MockProvider {
    services: HashMap<StrategyKind, MockService>,
    opens: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, kind: StrategyKind, space: MockConfigSpace) -> Self {
        self.services.insert(kind, MockService::Available(space));
        self
    }

    pub fn with_failing_service(mut self, kind: StrategyKind, status: IoReturn) -> Self {
        self.services.insert(kind, MockService::Refuses(status));
        self
    }

    /// Counts every open attempt, successful or not.
    pub fn open_count(&self) -> Arc<AtomicUsize> {
        self.opens.clone()
    }
}

impl ServiceProvider for MockProvider {
    fn open(
        &self,
        service: &str,
        client_type: u32,
    ) -> Result<Box<dyn TransactionChannel>, OpenError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let kind = StrategyKind::PRIORITY
            .into_iter()
            .find(|kind| kind.service_name() == service)
            .ok_or(OpenError::NotFound)?;
        match self.services.get(&kind) {
            None => Err(OpenError::NotFound),
            Some(_) if client_type != kind.client_type() => {
                Err(OpenError::OpenFailed(IoReturn::BAD_ARGUMENT))
            }
            Some(MockService::Refuses(status)) => Err(OpenError::OpenFailed(*status)),
            Some(MockService::Available(space)) => Ok(Box::new(space.channel(kind))),
        }
    }
}

struct MockNode {
    bridge: bool,
    children: Vec<usize>,
    fail: bool,
}

/// A device tree of indexed nodes. Node 0 is the root.
pub struct MockHierarchy {
    nodes: Vec<MockNode>,
    walks: Arc<AtomicUsize>,
}

impl MockHierarchy {
    pub fn new() -> Self {
        Self {
            nodes: vec![MockNode {
                bridge: false,
                children: Vec::new(),
                fail: false,
            }],
            walks: Arc::default(),
        }
    }

    pub fn root_id(&self) -> usize {
        0
    }

    pub fn add(&mut self, parent: usize, bridge: bool) -> usize {
        let id = self.nodes.len();
        self.nodes.push(MockNode {
            bridge,
            children: Vec::new(),
            fail: false,
        });
        self.nodes[parent].children.push(id);
        id
    }

    pub fn fail_children(&mut self, node: usize) {
        self.nodes[node].fail = true;
    }

    /// Counts walks, which each start by fetching the root.
    pub fn walk_count(&self) -> Arc<AtomicUsize> {
        self.walks.clone()
    }
}

impl DeviceHierarchy for MockHierarchy {
    type Node = usize;

    fn root(&self) -> anyhow::Result<usize> {
        self.walks.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }

    fn children(&self, node: &usize) -> anyhow::Result<Vec<usize>> {
        let node = &self.nodes[*node];
        if node.fail {
            anyhow::bail!("registry iteration failed");
        }
        Ok(node.children.clone())
    }

    fn is_pci_bridge(&self, node: &usize) -> bool {
        self.nodes[*node].bridge
    }
}

/// Records each probed bus and reports a single function on it.
#[derive(Default)]
pub struct SpyProbe {
    calls: Vec<(u16, u8)>,
    bridges: HashMap<u8, u8>,
    failures: HashMap<u8, IoReturn>,
}

impl SpyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `secondary` whenever `bus` is probed.
    pub fn with_bridge(mut self, bus: u8, secondary: u8) -> Self {
        self.bridges.insert(bus, secondary);
        self
    }

    pub fn with_failure(mut self, bus: u8, status: IoReturn) -> Self {
        self.failures.insert(bus, status);
        self
    }

    pub fn calls(&self) -> &[(u16, u8)] {
        &self.calls
    }
}

impl BusProbe for SpyProbe {
    fn probe_bus(
        &mut self,
        _strategy: &BoundStrategy,
        domain: u16,
        bus: u8,
        map: &mut BusMap,
        failures: &mut Vec<BusProbeFailed>,
    ) -> Vec<PciAddress> {
        self.calls.push((domain, bus));
        map.mark(bus);
        if let Some(&status) = self.failures.get(&bus) {
            failures.push(BusProbeFailed {
                domain,
                bus,
                source: AccessError::TransactionFailed {
                    status,
                    message: status.to_string(),
                },
            });
            return Vec::new();
        }
        if let Some(&secondary) = self.bridges.get(&bus) {
            map.mark(secondary);
        }
        vec![PciAddress::function(domain, bus, 0, 0).unwrap()]
    }
}
