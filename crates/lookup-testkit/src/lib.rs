// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use lookup_core::{
    CatalogBackend, CatalogRequest, FormEvent, Item, ResultPage, SearchFailure, SearchRequest,
};
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;

pub const HOSPITAL_ENDPOINT: &str = "hospitals/search";
pub const SERVICE_ENDPOINT: &str = "services/search";
pub const OFFICE_ENDPOINT: &str = "offices/search";
pub const SUPPLY_ENDPOINT: &str = "supplies/search";

const HOSPITAL_NAMES: [&str; 12] = [
    "Central",
    "Northside",
    "Lakeside",
    "Saint Mary",
    "Riverside",
    "Mercy",
    "Summit",
    "Valley",
    "Harbor",
    "Pinecrest",
    "Westfield",
    "Eastgate",
];
const HOSPITAL_KINDS: [&str; 4] = ["General Hospital", "Medical Center", "Clinic", "Institute"];

const SERVICE_NAMES: [&str; 12] = [
    "Radiology",
    "Cardiology",
    "Pediatrics",
    "Oncology",
    "Emergency",
    "Orthopedics",
    "Neurology",
    "Dermatology",
    "Maternity",
    "Pharmacy",
    "Surgery",
    "Laboratory",
];

const WINGS: [&str; 6] = ["North", "South", "East", "West", "Annex", "Tower"];

const SUPPLY_NAMES: [&str; 10] = [
    "Gauze",
    "Syringe",
    "Catheter",
    "Saline",
    "Gloves",
    "Bandage",
    "Scalpel",
    "Thermometer",
    "Suture",
    "Mask",
];
const SUPPLY_SIZES: [&str; 4] = ["Small", "Medium", "Large", "Sterile"];

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }
}

/// Seeded generator of catalog labels. Equal seeds give equal catalogs.
#[derive(Debug, Clone)]
pub struct CatalogFaker {
    rng: DeterministicRng,
}

impl CatalogFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
        }
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    pub fn hospital_name(&mut self) -> String {
        format!("{} {}", self.pick(&HOSPITAL_NAMES), self.pick(&HOSPITAL_KINDS))
    }

    pub fn service_name(&mut self) -> String {
        self.pick(&SERVICE_NAMES).to_owned()
    }

    pub fn office_name(&mut self) -> String {
        let wing = self.pick(&WINGS);
        let room = 100 + self.rng.int_n(400);
        format!("{wing} Wing {room}")
    }

    pub fn supply_name(&mut self) -> String {
        format!("{} {}", self.pick(&SUPPLY_SIZES), self.pick(&SUPPLY_NAMES))
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }
}

/// One row of a fake catalog. `tags` are matched against request parameters
/// of the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub item: Item,
    pub tags: BTreeMap<String, String>,
}

impl CatalogEntry {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            item: Item::new(id, label),
            tags: BTreeMap::new(),
        }
    }

    pub fn tagged(mut self, name: &str, value: &str) -> Self {
        self.tags.insert(name.to_owned(), value.to_owned());
        self
    }

    fn matches(&self, request: &CatalogRequest) -> bool {
        let query = request.query.trim().to_lowercase();
        if !query.is_empty() && !self.item.label.to_lowercase().contains(&query) {
            return false;
        }
        request.params.iter().all(|(name, value)| {
            self.tags
                .get(name)
                .is_none_or(|tagged| tagged == value)
        })
    }
}

/// In-memory paginated catalog. Records every request and can be scripted
/// to fail the next calls.
#[derive(Debug, Default)]
pub struct FakeCatalog {
    endpoints: BTreeMap<String, Vec<CatalogEntry>>,
    scripted: Mutex<VecDeque<SearchFailure>>,
    log: Mutex<Vec<CatalogRequest>>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, endpoint: &str, entries: Vec<CatalogEntry>) -> Self {
        self.endpoints.insert(endpoint.to_owned(), entries);
        self
    }

    /// Hospitals, their services (tagged `hospital_id`) and the offices of
    /// each service (tagged `service_id`). Ids look like `h1`, `h1-s2`,
    /// `h1-s2-o3`.
    pub fn hospital_network(
        seed: u64,
        hospitals: usize,
        services_per_hospital: usize,
        offices_per_service: usize,
    ) -> Self {
        let mut faker = CatalogFaker::new(seed);
        let mut hospital_rows = Vec::with_capacity(hospitals);
        let mut service_rows = Vec::new();
        let mut office_rows = Vec::new();

        for h in 1..=hospitals {
            let hospital_id = format!("h{h}");
            hospital_rows.push(CatalogEntry::new(
                hospital_id.clone(),
                format!("{} #{h}", faker.hospital_name()),
            ));
            for s in 1..=services_per_hospital {
                let service_id = format!("{hospital_id}-s{s}");
                service_rows.push(
                    CatalogEntry::new(service_id.clone(), format!("{} #{s}", faker.service_name()))
                        .tagged("hospital_id", &hospital_id),
                );
                for o in 1..=offices_per_service {
                    office_rows.push(
                        CatalogEntry::new(format!("{service_id}-o{o}"), faker.office_name())
                            .tagged("service_id", &service_id),
                    );
                }
            }
        }

        Self::new()
            .with_endpoint(HOSPITAL_ENDPOINT, hospital_rows)
            .with_endpoint(SERVICE_ENDPOINT, service_rows)
            .with_endpoint(OFFICE_ENDPOINT, office_rows)
    }

    /// A flat catalog of `count` supplies with ids `1..=count`.
    pub fn supplies(seed: u64, count: usize) -> Self {
        let mut faker = CatalogFaker::new(seed);
        let rows = (1..=count)
            .map(|n| CatalogEntry::new(n.to_string(), format!("{} {n}", faker.supply_name())))
            .collect();
        Self::new().with_endpoint(SUPPLY_ENDPOINT, rows)
    }

    pub fn entries(&self, endpoint: &str) -> &[CatalogEntry] {
        self.endpoints
            .get(endpoint)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Makes the next call fail with `failure`. Calls queue up in order.
    pub fn fail_next(&self, failure: SearchFailure) {
        lock(&self.scripted).push_back(failure);
    }

    pub fn requests(&self) -> Vec<CatalogRequest> {
        lock(&self.log).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.log).len()
    }
}

impl CatalogBackend for FakeCatalog {
    fn fetch_page(&self, request: &CatalogRequest) -> Result<ResultPage, SearchFailure> {
        lock(&self.log).push(request.clone());
        if let Some(failure) = lock(&self.scripted).pop_front() {
            return Err(failure);
        }

        let Some(entries) = self.endpoints.get(&request.endpoint) else {
            return Err(SearchFailure::rejected(
                Some(404),
                Some(format!("unknown endpoint {}", request.endpoint)),
            ));
        };

        let matching: Vec<&CatalogEntry> = entries
            .iter()
            .filter(|entry| entry.matches(request))
            .collect();
        let per_page = request.per_page.max(1) as usize;
        let total_count = matching.len();
        let total_pages = total_count.div_ceil(per_page);
        let page = request.page.max(1) as usize;
        let items = matching
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .map(|entry| entry.item.clone())
            .collect();

        Ok(ResultPage::new(
            items,
            request.page,
            total_pages as u32,
            total_count as u64,
        ))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Requests captured from form events, resolved in whatever order a test
/// wants.
#[derive(Debug, Default)]
pub struct RequestQueue {
    pending: VecDeque<SearchRequest>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures every issued request in `events`; returns how many.
    pub fn capture(&mut self, events: &[FormEvent]) -> usize {
        let before = self.pending.len();
        self.pending
            .extend(events.iter().filter_map(|event| match event {
                FormEvent::RequestIssued(request) => Some(request.clone()),
                _ => None,
            }));
        self.pending.len() - before
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pop_oldest(&mut self) -> Option<SearchRequest> {
        self.pending.pop_front()
    }

    pub fn pop_newest(&mut self) -> Option<SearchRequest> {
        self.pending.pop_back()
    }

    pub fn drain(&mut self) -> Vec<SearchRequest> {
        self.pending.drain(..).collect()
    }
}

pub fn temp_config_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let config_path = dir.path().join("config.toml");
    Ok((dir, config_path))
}
