#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::io;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use tessera::application::access::Actor;
use tessera::application::pieces::{PieceCatalog, PieceService};
use tessera::application::repos::{
    CreateLocationParams, CreatePageMetaParams, CreatePieceParams, PageMetaRepo, PiecesRepo,
    RepoError, UpdatePageMetaParams,
};
use tessera::application::views::{
    CompiledView, FileManager, ViewCacheLocator, ViewCompiler, ViewEnvironment, ViewError,
};
use tessera::domain::entities::{PageMetaRecord, PieceLocationRecord, PieceRecord};
use tessera::domain::types::{ContentCode, MetaKey, ViewAddress};
use tessera::infra::access::RolePermissions;

pub const EDIT_PERMISSION: &str = "cms.edit";

#[derive(Default)]
struct PieceTables {
    pieces: Vec<PieceRecord>,
    locations: Vec<PieceLocationRecord>,
}

/// In-memory pieces table with the same uniqueness rules as the Postgres schema.
#[derive(Default)]
pub struct MemoryPieces {
    tables: Mutex<PieceTables>,
    hidden_lookups: AtomicUsize,
    failing_lookups: AtomicUsize,
    location_creates: AtomicUsize,
}

impl MemoryPieces {
    /// Make the next `count` lookups miss, as if a concurrent writer inserted
    /// the row right after this caller looked.
    pub fn hide_next_lookups(&self, count: usize) {
        self.hidden_lookups.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` lookups by code time out.
    pub fn fail_next_lookups(&self, count: usize) {
        self.failing_lookups.store(count, Ordering::SeqCst);
    }

    pub async fn pieces(&self) -> Vec<PieceRecord> {
        self.tables.lock().await.pieces.clone()
    }

    pub async fn locations(&self) -> Vec<PieceLocationRecord> {
        self.tables.lock().await.locations.clone()
    }

    pub fn location_creates(&self) -> usize {
        self.location_creates.load(Ordering::SeqCst)
    }

    pub async fn seed_piece(&self, code: &str, content: &str) -> PieceRecord {
        let now = OffsetDateTime::now_utc();
        let record = PieceRecord {
            id: Uuid::new_v4(),
            code: code.to_string(),
            content: content.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().await.pieces.push(record.clone());
        record
    }

    /// Insert a location row directly, bypassing validation of the address.
    pub async fn seed_location(&self, piece_id: Uuid, namespace: &str, view: &str) {
        self.tables.lock().await.locations.push(PieceLocationRecord {
            id: Uuid::new_v4(),
            piece_id,
            namespace: namespace.to_string(),
            view: view.to_string(),
            created_at: OffsetDateTime::now_utc(),
        });
    }

    fn lookup_hidden(&self) -> bool {
        take_one(&self.hidden_lookups)
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl PiecesRepo for MemoryPieces {
    async fn find_piece_by_code(
        &self,
        code: &ContentCode,
    ) -> Result<Option<PieceRecord>, RepoError> {
        if take_one(&self.failing_lookups) {
            return Err(RepoError::Timeout);
        }
        if self.lookup_hidden() {
            return Ok(None);
        }
        let tables = self.tables.lock().await;
        Ok(tables
            .pieces
            .iter()
            .find(|piece| piece.code == code.as_str())
            .cloned())
    }

    async fn create_piece(&self, params: CreatePieceParams) -> Result<PieceRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables
            .pieces
            .iter()
            .any(|piece| piece.code == params.code.as_str())
        {
            return Err(RepoError::Duplicate {
                constraint: "pieces_code_key".to_string(),
            });
        }
        let now = OffsetDateTime::now_utc();
        let record = PieceRecord {
            id: Uuid::new_v4(),
            code: params.code.to_string(),
            content: params.content,
            created_at: now,
            updated_at: now,
        };
        tables.pieces.push(record.clone());
        Ok(record)
    }

    async fn update_piece_content(
        &self,
        id: Uuid,
        content: &str,
    ) -> Result<PieceRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let piece = tables
            .pieces
            .iter_mut()
            .find(|piece| piece.id == id)
            .ok_or(RepoError::NotFound)?;
        piece.content = content.to_string();
        piece.updated_at = OffsetDateTime::now_utc();
        Ok(piece.clone())
    }

    async fn list_locations(&self, piece_id: Uuid) -> Result<Vec<PieceLocationRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .locations
            .iter()
            .filter(|location| location.piece_id == piece_id)
            .cloned()
            .collect())
    }

    async fn create_location(
        &self,
        params: CreateLocationParams,
    ) -> Result<PieceLocationRecord, RepoError> {
        self.location_creates.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.lock().await;
        if !tables.pieces.iter().any(|piece| piece.id == params.piece_id) {
            return Err(RepoError::InvalidInput {
                message: "piece does not exist".to_string(),
            });
        }
        if tables
            .locations
            .iter()
            .any(|location| location.piece_id == params.piece_id && location.is_at(&params.address))
        {
            return Err(RepoError::Duplicate {
                constraint: "piece_locations_piece_id_view_namespace_key".to_string(),
            });
        }
        let record = PieceLocationRecord {
            id: Uuid::new_v4(),
            piece_id: params.piece_id,
            namespace: params.address.namespace().to_string(),
            view: params.address.view().to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        tables.locations.push(record.clone());
        Ok(record)
    }

    async fn delete_location(&self, id: Uuid) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        let before = tables.locations.len();
        tables.locations.retain(|location| location.id != id);
        if tables.locations.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryMeta {
    records: Mutex<Vec<PageMetaRecord>>,
    hidden_lookups: AtomicUsize,
}

impl MemoryMeta {
    pub fn hide_next_lookups(&self, count: usize) {
        self.hidden_lookups.store(count, Ordering::SeqCst);
    }

    pub async fn records(&self) -> Vec<PageMetaRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl PageMetaRepo for MemoryMeta {
    async fn find_meta(&self, key: &MetaKey) -> Result<Option<PageMetaRecord>, RepoError> {
        if take_one(&self.hidden_lookups) {
            return Ok(None);
        }
        let records = self.records.lock().await;
        Ok(records.iter().find(|record| record.key_matches(key)).cloned())
    }

    async fn create_meta(&self, params: CreatePageMetaParams) -> Result<PageMetaRecord, RepoError> {
        let mut records = self.records.lock().await;
        if records.iter().any(|record| record.key_matches(&params.key)) {
            return Err(RepoError::Duplicate {
                constraint: "page_meta_namespace_view_code_key".to_string(),
            });
        }
        let now = OffsetDateTime::now_utc();
        let record = PageMetaRecord {
            id: Uuid::new_v4(),
            namespace: params.key.address.namespace().to_string(),
            view: params.key.address.view().to_string(),
            code: params.key.code.to_string(),
            title: params.fields.title,
            description: params.fields.description,
            keywords: params.fields.keywords,
            created_at: now,
            updated_at: now,
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn update_meta(&self, params: UpdatePageMetaParams) -> Result<PageMetaRecord, RepoError> {
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|record| record.id == params.id)
            .ok_or(RepoError::NotFound)?;
        record.title = params.fields.title;
        record.description = params.fields.description;
        record.keywords = params.fields.keywords;
        record.updated_at = OffsetDateTime::now_utc();
        Ok(record.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileCall {
    pub address: ViewAddress,
    pub editable: bool,
    pub force: bool,
}

/// Records every compilation and fails for configured addresses.
#[derive(Default)]
pub struct RecordingCompiler {
    calls: Mutex<Vec<CompileCall>>,
    failing: Mutex<HashSet<ViewAddress>>,
    storage_down: Mutex<HashSet<ViewAddress>>,
}

impl RecordingCompiler {
    /// Compiling `address` reports a broken template.
    pub async fn fail_for(&self, address: ViewAddress) {
        self.failing.lock().await.insert(address);
    }

    /// Compiling `address` reports a storage timeout while resolving slots.
    pub async fn storage_down_for(&self, address: ViewAddress) {
        self.storage_down.lock().await.insert(address);
    }

    pub async fn calls(&self) -> Vec<CompileCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl ViewCompiler for RecordingCompiler {
    fn environment(&self) -> ViewEnvironment {
        ViewEnvironment::new().with_dependency("site.theme", true)
    }

    async fn compile(
        &self,
        address: &ViewAddress,
        environment: &ViewEnvironment,
        force: bool,
    ) -> Result<CompiledView, ViewError> {
        self.calls.lock().await.push(CompileCall {
            address: address.clone(),
            editable: environment.is_editable(),
            force,
        });
        if self.failing.lock().await.contains(address) {
            return Err(ViewError::compile(address, "template is broken"));
        }
        if self.storage_down.lock().await.contains(address) {
            return Err(ViewError::Content {
                address: address.to_string(),
                source: RepoError::Timeout,
            });
        }
        Ok(CompiledView {
            address: address.clone(),
            editable: environment.is_editable(),
            path: PathBuf::from(format!(
                "/cache/{}/{}.{}.html",
                address.namespace(),
                address.view(),
                environment.cache_tag()
            )),
            html: format!("<p>{address}</p>"),
        })
    }
}

/// Cache locator backed by a fixed listing per address.
#[derive(Default)]
pub struct MemoryCache {
    files: Mutex<HashMap<ViewAddress, Vec<PathBuf>>>,
}

impl MemoryCache {
    pub async fn put(&self, address: ViewAddress, paths: Vec<PathBuf>) {
        self.files.lock().await.insert(address, paths);
    }
}

#[async_trait]
impl ViewCacheLocator for MemoryCache {
    async fn cache_files(&self, address: &ViewAddress) -> Result<Vec<PathBuf>, ViewError> {
        Ok(self
            .files
            .lock()
            .await
            .get(address)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct RecordingFiles {
    deleted: Mutex<Vec<PathBuf>>,
    read_only: AtomicBool,
}

impl RecordingFiles {
    /// Every later delete fails with a permission error.
    pub fn make_read_only(&self) {
        self.read_only.store(true, Ordering::SeqCst);
    }

    pub async fn deleted(&self) -> Vec<PathBuf> {
        self.deleted.lock().await.clone()
    }
}

#[async_trait]
impl FileManager for RecordingFiles {
    async fn delete(&self, path: &Path) -> Result<(), ViewError> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(ViewError::cache(
                path,
                io::Error::new(io::ErrorKind::PermissionDenied, "read-only cache"),
            ));
        }
        self.deleted.lock().await.push(path.to_path_buf());
        Ok(())
    }
}

pub struct Harness {
    pub service: PieceService,
    pub pieces: Arc<MemoryPieces>,
    pub meta: Arc<MemoryMeta>,
    pub compiler: Arc<RecordingCompiler>,
    pub cache: Arc<MemoryCache>,
    pub files: Arc<RecordingFiles>,
}

impl Harness {
    pub fn new() -> Self {
        let pieces = Arc::new(MemoryPieces::default());
        let meta = Arc::new(MemoryMeta::default());
        let compiler = Arc::new(RecordingCompiler::default());
        let cache = Arc::new(MemoryCache::default());
        let files = Arc::new(RecordingFiles::default());

        let catalog = Arc::new(PieceCatalog::new(pieces.clone(), meta.clone()));
        let service = PieceService::new(
            catalog,
            compiler.clone(),
            cache.clone(),
            files.clone(),
            Arc::new(permissions()),
        )
        .with_edit_permission(EDIT_PERMISSION);

        Self {
            service,
            pieces,
            meta,
            compiler,
            cache,
            files,
        }
    }
}

pub fn permissions() -> RolePermissions {
    RolePermissions::default().grant("editor", "cms.*")
}

pub fn editor() -> Actor {
    Actor::new("ada", vec!["editor".to_string()])
}

pub fn viewer() -> Actor {
    Actor::new("guest", vec!["viewer".to_string()])
}

pub fn address(namespace: &str, view: &str) -> ViewAddress {
    ViewAddress::new(namespace, view).expect("valid address")
}

pub fn code(raw: &str) -> ContentCode {
    ContentCode::parse(raw).expect("valid code")
}
