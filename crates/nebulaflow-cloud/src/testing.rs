//! In-memory control plane for tests
//!
//! [`FakeControlPlane`] keeps resources in memory and mimics the behaviour
//! the reconciliation code depends on:
//!
//! - names are unique per kind (except VMs)
//! - VMs get an address per NIC, exposed as `CONTEXT/ETH<n>_IP`
//! - router NICs with `FLOATING_IP = YES` lease an address and expose it as
//!   `VROUTER_IP`
//! - router VMs are named `vr-<router>-<n>` unless the instantiate document
//!   carries a `NAME`
//! - leases stay on a network after their holder is deleted, until released
//! - a network with leased addresses cannot be deleted, and a lease held by a
//!   live resource cannot be released
//!
//! Every call is recorded and can be inspected with [`FakeControlPlane::calls`].

use crate::error::{CloudError, Result};
use crate::provider::{
    AddressRange, ControlPlane, ResourceId, ResourceInfo, ResourceKind, UpdateMode,
};
use crate::template::{CONTEXT_SECTION, Document, Element, Section};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard};

/// Image state code reported for newly created images (READY)
pub const IMAGE_READY: i32 = 1;

/// A recorded control plane call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Resolve { kind: ResourceKind, name: String },
    FetchInfo { kind: ResourceKind, id: ResourceId },
    Create { kind: ResourceKind, name: String },
    Update { kind: ResourceKind, id: ResourceId },
    Delete { kind: ResourceKind, id: ResourceId },
    ReleaseLease { network: ResourceId, address: String },
    Instantiate { router: ResourceId, replicas: u32 },
}

impl Call {
    /// Whether the call changes remote state
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Call::Resolve { .. } | Call::FetchInfo { .. })
    }
}

/// A call that should fail once with [`CloudError::RemoteFailure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Create(ResourceKind),
    Update(ResourceKind),
    Delete(ResourceKind),
    ReleaseLease,
    Instantiate,
}

#[derive(Debug, Clone)]
struct FakeResource {
    name: String,
    template: Document,
    state: Option<i32>,
    address_ranges: Vec<AddressRange>,
    vms: Vec<ResourceId>,
}

#[derive(Debug, Default)]
struct FakeState {
    next_ids: HashMap<ResourceKind, u32>,
    resources: BTreeMap<(ResourceKind, ResourceId), FakeResource>,
    lease_holders: HashMap<(ResourceId, String), (ResourceKind, ResourceId)>,
    next_host: u32,
    fail_points: Vec<FailPoint>,
    calls: Vec<Call>,
}

impl FakeState {
    fn check(&mut self, point: FailPoint) -> Result<()> {
        if let Some(pos) = self.fail_points.iter().position(|p| *p == point) {
            self.fail_points.remove(pos);
            tracing::debug!("Injecting failure at {:?}", point);
            return Err(CloudError::RemoteFailure(format!("injected failure: {:?}", point)));
        }
        Ok(())
    }

    fn find(&self, kind: ResourceKind, name: &str) -> Option<ResourceId> {
        self.resources
            .iter()
            .find(|((k, _), r)| *k == kind && r.name == name)
            .map(|((_, id), _)| *id)
    }

    fn get(&self, kind: ResourceKind, id: ResourceId) -> Result<&FakeResource> {
        self.resources
            .get(&(kind, id))
            .ok_or_else(|| CloudError::not_found(kind, id.to_string()))
    }

    fn get_mut(&mut self, kind: ResourceKind, id: ResourceId) -> Result<&mut FakeResource> {
        self.resources
            .get_mut(&(kind, id))
            .ok_or_else(|| CloudError::not_found(kind, id.to_string()))
    }

    fn next_id(&mut self, kind: ResourceKind) -> ResourceId {
        let next = self.next_ids.entry(kind).or_insert(0);
        let id = ResourceId::new(*next);
        *next += 1;
        id
    }

    /// Lease an address for `holder` from the network named `network`, or
    /// from the default pool when no such network exists
    fn lease(
        &mut self,
        network: Option<&str>,
        requested: Option<&str>,
        holder: (ResourceKind, ResourceId),
    ) -> Result<String> {
        let network_id = network.and_then(|n| self.find(ResourceKind::VirtualNetwork, n));
        let Some(network_id) = network_id else {
            if let Some(ip) = requested {
                return Ok(ip.to_string());
            }
            self.next_host += 1;
            return Ok(format!("10.0.0.{}", self.next_host + 9));
        };

        let ranges = &mut self.get_mut(ResourceKind::VirtualNetwork, network_id)?.address_ranges;
        let mut leased = None;
        for ar in ranges.iter_mut() {
            let Some(base) = ar.ip.as_deref().and_then(|ip| ip.parse::<Ipv4Addr>().ok()) else {
                continue;
            };
            let candidates = (0..ar.size).map(|n| Ipv4Addr::from(u32::from(base) + n).to_string());
            let found = match requested {
                Some(ip) => candidates.into_iter().find(|c| c == ip),
                None => candidates.into_iter().find(|c| !ar.leases.contains(c)),
            };
            if let Some(address) = found {
                if ar.leases.contains(&address) {
                    return Err(CloudError::RemoteFailure(format!(
                        "address {} is already leased",
                        address
                    )));
                }
                ar.leases.push(address.clone());
                leased = Some(address);
                break;
            }
        }

        let address = leased.ok_or_else(|| {
            CloudError::RemoteFailure(format!("no free address in VNet {}", network_id))
        })?;
        self.lease_holders
            .insert((network_id, address.clone()), holder);
        Ok(address)
    }

    fn insert(&mut self, kind: ResourceKind, template: &Document) -> Result<ResourceId> {
        let id = self.next_id(kind);
        let name = template
            .get("NAME")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-{}", kind, id));
        if kind != ResourceKind::Vm {
            if let Some(existing) = self.find(kind, &name) {
                return Err(CloudError::RemoteFailure(format!(
                    "NAME is already taken by {} {}",
                    kind, existing
                )));
            }
        }

        let mut template = template.clone();
        let mut state = None;
        let mut address_ranges = Vec::new();
        match kind {
            ResourceKind::Vm => {
                let nics: Vec<(Option<String>, Option<String>)> = template
                    .nics()
                    .map(|n| {
                        (
                            n.get("NETWORK").map(str::to_string),
                            n.get("IP").map(str::to_string),
                        )
                    })
                    .collect();
                let mut addresses = Vec::new();
                for (network, ip) in &nics {
                    addresses.push(self.lease(network.as_deref(), ip.as_deref(), (kind, id))?);
                }
                if addresses.is_empty() {
                    addresses.push(self.lease(None, None, (kind, id))?);
                }
                for (index, address) in addresses.iter().enumerate() {
                    if let Some(nic) = template.locate_nic_mut(index) {
                        nic.set("IP", address.clone());
                    }
                    template
                        .ensure_section(CONTEXT_SECTION)
                        .set(format!("ETH{}_IP", index), address.clone());
                }
            }
            ResourceKind::VirtualRouter => {
                for index in 0..template.nic_count() {
                    let (floating, network, ip) = match template.locate_nic(index) {
                        Some(nic) => (
                            nic.get("FLOATING_IP") == Some("YES"),
                            nic.get("NETWORK").map(str::to_string),
                            nic.get("IP").map(str::to_string),
                        ),
                        None => continue,
                    };
                    if !floating {
                        continue;
                    }
                    let address = self.lease(network.as_deref(), ip.as_deref(), (kind, id))?;
                    if let Some(nic) = template.locate_nic_mut(index) {
                        nic.set("VROUTER_IP", address);
                    }
                }
            }
            ResourceKind::VirtualNetwork => {
                for (index, ar) in template.sections("AR").enumerate() {
                    address_ranges.push(AddressRange {
                        id: index as u32,
                        ip: ar.get("IP").map(str::to_string),
                        size: ar.get("SIZE").and_then(|s| s.parse().ok()).unwrap_or(0),
                        leases: Vec::new(),
                    });
                }
            }
            ResourceKind::Image => state = Some(IMAGE_READY),
            ResourceKind::Template => {}
        }

        self.resources.insert(
            (kind, id),
            FakeResource {
                name,
                template,
                state,
                address_ranges,
                vms: Vec::new(),
            },
        );
        Ok(id)
    }
}

fn merge_into(target: &mut Document, update: &Document) {
    for element in update.elements() {
        match element {
            Element::Pair(p) => target.set(p.key.clone(), p.value.clone()),
            Element::Section(s) => target
                .ensure_section(s.name())
                .upsert(s.pairs().iter().map(|p| (p.key.clone(), p.value.clone()))),
        }
    }
}

/// In-memory [`ControlPlane`]
#[derive(Debug, Default)]
pub struct FakeControlPlane {
    state: Mutex<FakeState>,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake control plane lock poisoned")
    }

    /// Insert a resource without recording a call
    pub fn seed(&self, kind: ResourceKind, template: Document) -> ResourceId {
        self.lock()
            .insert(kind, &template)
            .expect("seeded resource must be valid")
    }

    /// Insert a catalog template named `name` with the given text content
    pub fn seed_template(&self, name: &str, content: &str) -> ResourceId {
        let mut template = Document::new();
        template.add_pair("NAME", name);
        template.append(Document::parse(content).expect("seeded template must parse"));
        self.seed(ResourceKind::Template, template)
    }

    /// Insert a network with one address range of `size` addresses from `first_ip`
    pub fn seed_network(&self, name: &str, first_ip: &str, size: u32) -> ResourceId {
        let mut template = Document::new();
        template.add_pair("NAME", name);
        let mut ar = Section::new("AR");
        ar.add_pair("TYPE", "IP4");
        ar.add_pair("IP", first_ip);
        ar.add_pair("SIZE", size.to_string());
        template.add_section(ar);
        self.seed(ResourceKind::VirtualNetwork, template)
    }

    pub fn set_state(&self, kind: ResourceKind, id: ResourceId, state: i32) {
        if let Ok(resource) = self.lock().get_mut(kind, id) {
            resource.state = Some(state);
        }
    }

    /// Make the next matching call fail
    pub fn fail_next(&self, point: FailPoint) {
        self.lock().fail_points.push(point);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Recorded calls that change remote state
    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Look up a resource by name without recording a call
    pub fn info(&self, kind: ResourceKind, name: &str) -> Option<ResourceInfo> {
        let state = self.lock();
        let id = state.find(kind, name)?;
        let resource = state.get(kind, id).ok()?;
        Some(to_info(id, resource))
    }

    /// Number of live resources of `kind`
    pub fn count(&self, kind: ResourceKind) -> usize {
        self.lock()
            .resources
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Addresses currently leased from a network
    pub fn leases(&self, network: ResourceId) -> Vec<String> {
        self.lock()
            .get(ResourceKind::VirtualNetwork, network)
            .map(|r| r.address_ranges.iter().flat_map(|ar| ar.leases.clone()).collect())
            .unwrap_or_default()
    }
}

fn to_info(id: ResourceId, resource: &FakeResource) -> ResourceInfo {
    ResourceInfo {
        id,
        name: resource.name.clone(),
        template: resource.template.clone(),
        state: resource.state,
        address_ranges: resource.address_ranges.clone(),
        vms: resource.vms.clone(),
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn resolve_id_by_name(&self, kind: ResourceKind, name: &str) -> Result<ResourceId> {
        let mut state = self.lock();
        state.calls.push(Call::Resolve {
            kind,
            name: name.to_string(),
        });
        state
            .find(kind, name)
            .ok_or_else(|| CloudError::not_found(kind, name))
    }

    async fn fetch_info(&self, kind: ResourceKind, id: ResourceId) -> Result<ResourceInfo> {
        let mut state = self.lock();
        state.calls.push(Call::FetchInfo { kind, id });
        state.get(kind, id).map(|r| to_info(id, r))
    }

    async fn create(&self, kind: ResourceKind, template: &Document) -> Result<ResourceId> {
        let mut state = self.lock();
        state.calls.push(Call::Create {
            kind,
            name: template.get("NAME").unwrap_or_default().to_string(),
        });
        state.check(FailPoint::Create(kind))?;
        state.insert(kind, template)
    }

    async fn update(
        &self,
        kind: ResourceKind,
        id: ResourceId,
        template: &Document,
        mode: UpdateMode,
    ) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::Update { kind, id });
        state.check(FailPoint::Update(kind))?;
        let resource = state.get_mut(kind, id)?;
        match mode {
            UpdateMode::Replace => resource.template = template.clone(),
            UpdateMode::Merge => merge_into(&mut resource.template, template),
        }
        Ok(())
    }

    async fn delete(&self, kind: ResourceKind, id: ResourceId) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::Delete { kind, id });
        state.check(FailPoint::Delete(kind))?;
        let resource = state.get(kind, id)?;
        if kind == ResourceKind::VirtualNetwork {
            let leased: usize = resource.address_ranges.iter().map(|ar| ar.leases.len()).sum();
            if leased > 0 {
                return Err(CloudError::RemoteFailure(format!(
                    "VNet {} is in use: {} leased addresses",
                    id, leased
                )));
            }
        }
        let vms = resource.vms.clone();
        for vm in vms {
            state.resources.remove(&(ResourceKind::Vm, vm));
        }
        state.resources.remove(&(kind, id));
        Ok(())
    }

    async fn release_lease(&self, network: ResourceId, address: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::ReleaseLease {
            network,
            address: address.to_string(),
        });
        state.check(FailPoint::ReleaseLease)?;
        state.get(ResourceKind::VirtualNetwork, network)?;
        let key = (network, address.to_string());
        if let Some(&(kind, holder)) = state.lease_holders.get(&key) {
            if state.resources.contains_key(&(kind, holder)) {
                return Err(CloudError::RemoteFailure(format!(
                    "address {} is in use by {} {}",
                    address, kind, holder
                )));
            }
        }
        state.lease_holders.remove(&key);
        for ar in &mut state.get_mut(ResourceKind::VirtualNetwork, network)?.address_ranges {
            ar.leases.retain(|l| l != address);
        }
        Ok(())
    }

    async fn instantiate(
        &self,
        router: ResourceId,
        replicas: u32,
        template: ResourceId,
        extra: &Document,
    ) -> Result<Vec<ResourceId>> {
        let mut state = self.lock();
        state.calls.push(Call::Instantiate { router, replicas });
        state.check(FailPoint::Instantiate)?;
        let router_name = state.get(ResourceKind::VirtualRouter, router)?.name.clone();
        let base = state.get(ResourceKind::Template, template)?.template.clone();

        let mut vms = Vec::new();
        for index in 0..replicas {
            let mut doc = base.clone();
            merge_into(&mut doc, extra);
            let name = match extra.get("NAME") {
                Some(name) => format!("{}-{}", name, index),
                None => format!("vr-{}-{}", router_name, index),
            };
            doc.set("NAME", name);
            doc.remove("CLUSTER_UID");
            vms.push(state.insert(ResourceKind::Vm, &doc)?);
        }
        state
            .get_mut(ResourceKind::VirtualRouter, router)?
            .vms
            .extend(vms.iter().copied());
        Ok(vms)
    }
}
