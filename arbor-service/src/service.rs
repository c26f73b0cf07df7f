use arbor_abi::{address_of, Address};
use arbor_config::{Settings, StoreKind};
use arbor_hash::Digest;
use arbor_merkle::{recover_root, recover_root_from_leaf, MerkleError, MerkleTree, Proof};
use parking_lot::Mutex;
use schnellru::{ByLength, LruMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::{
    CreateTree, FileStore, HexBytes, LeafProof, MemoryStore, ProofQuery, RetryPolicy, ServiceError,
    StoreError, TreeRecord, TreeStore, TreeView,
};

struct CachedTree {
    record: TreeRecord,
    tree: MerkleTree,
}

/// Creates, stores and answers queries about trees. Shareable across
/// threads; locks are held only for map access, never across a build.
pub struct Service {
    store: Box<dyn TreeStore>,
    cache: Mutex<LruMap<Digest, Arc<CachedTree>, ByLength>>,
    retry: RetryPolicy,
}

impl Service {
    pub fn new(store: impl TreeStore + 'static, cache_trees: u32, retry: RetryPolicy) -> Self {
        Self {
            store: Box::new(store),
            cache: Mutex::new(LruMap::new(ByLength::new(cache_trees.max(1)))),
            retry,
        }
    }

    /// In-memory store, default cache and retry.
    pub fn in_memory() -> Self {
        let s = Settings::default();
        Self::new(MemoryStore::new(), s.cache.trees, RetryPolicy::from(&s.retry))
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ServiceError> {
        let retry = RetryPolicy::from(&settings.retry);
        let trees = settings.cache.trees;
        let svc = match settings.store.kind {
            StoreKind::Memory => Self::new(MemoryStore::new(), trees, retry),
            StoreKind::File => Self::new(FileStore::open(&settings.store.path)?, trees, retry),
        };
        Ok(svc)
    }

    #[instrument(skip_all, fields(leaves = req.leaves.len()))]
    pub fn create_tree(&self, req: CreateTree) -> Result<Digest, ServiceError> {
        if req.leaves.is_empty() {
            return Err(MerkleError::EmptyInput.into());
        }
        let tree: MerkleTree = MerkleTree::build(req.leaves.as_slice())?;
        let root = tree.root();
        for (i, d) in tree.leaf_digests().iter().enumerate() {
            if recover_root(d, &tree.proof(i)?) != root {
                return Err(ServiceError::ProofCheck(i));
            }
        }
        let record = TreeRecord {
            leaves: req.leaves,
            leaf_types: req.leaf_types.unwrap_or_default(),
            packed: req.packed,
        };
        let inserted = self.retry.run("put", || self.store.put_if_absent(&root, &record))?;
        info!(%root, inserted, "tree created");
        if inserted {
            self.cache.lock().insert(root, Arc::new(CachedTree { record, tree }));
        } else {
            // first record stored under a root wins
            self.load(&root)?;
        }
        Ok(root)
    }

    pub fn get_tree(&self, root: &Digest) -> Result<TreeView, ServiceError> {
        let ct = self.load(root)?;
        let r = &ct.record;
        Ok(TreeView {
            leaves: r.leaves.clone(),
            leaf_count: r.leaves.len(),
            leaf_types: (!r.leaf_types.is_empty()).then(|| r.leaf_types.clone()),
            packed: r.packed,
        })
    }

    #[instrument(skip_all, fields(%root))]
    pub fn get_proof(&self, root: &Digest, query: &ProofQuery) -> Result<LeafProof, ServiceError> {
        let ct = self.load(root)?;
        let index = match query {
            ProofQuery::ByLeaf(leaf) => ct
                .record
                .leaves
                .iter()
                .position(|l| l.as_slice() == leaf.as_slice())
                .ok_or(MerkleError::LeafNotFound)?,
            ProofQuery::ByAddress(addr) => resolve_address(&ct.record, addr)?,
        };
        let proof = ct.tree.proof(index)?;
        debug!(index, siblings = proof.len(), "proof served");
        Ok(LeafProof { leaf: ct.record.leaves[index].clone(), proof })
    }

    /// Root implied by `leaf` and `proof`. Pure recomputation: the answer
    /// says nothing about whether any stored tree has that root.
    pub fn root_from_proof(leaf: &[u8], proof: &Proof) -> Digest {
        recover_root_from_leaf(leaf, proof)
    }

    /// Root of the first stored tree, in root order, in which some leaf's
    /// proof equals `proof`.
    #[instrument(skip_all, fields(siblings = proof.len()))]
    pub fn find_root(&self, proof: &Proof) -> Result<Digest, ServiceError> {
        if proof.is_empty() {
            return Err(ServiceError::EmptyProof);
        }
        let roots = self.retry.run("roots", || self.store.roots())?;
        for root in roots {
            // scanning must not evict the trees proofs are being served from
            let cached = self.cache.lock().peek(&root).cloned();
            let ct = match cached {
                Some(ct) => ct,
                None => match self.fetch(&root) {
                    Ok(ct) => Arc::new(ct),
                    Err(ServiceError::Store(e @ StoreError::Corrupt { .. })) => {
                        warn!(%root, error = %e, "skipping unreadable tree");
                        continue;
                    }
                    Err(e) => return Err(e),
                },
            };
            let found = ct
                .tree
                .leaf_digests()
                .iter()
                .enumerate()
                .any(|(i, d)| {
                    recover_root(d, proof) == root && ct.tree.proof(i).is_ok_and(|p| p == *proof)
                });
            if found {
                return Ok(root);
            }
        }
        Err(ServiceError::ProofNotFound)
    }

    fn load(&self, root: &Digest) -> Result<Arc<CachedTree>, ServiceError> {
        if let Some(ct) = self.cache.lock().get(root) {
            return Ok(Arc::clone(ct));
        }
        debug!(%root, "cache miss");
        let ct = Arc::new(self.fetch(root)?);
        self.cache.lock().insert(*root, Arc::clone(&ct));
        Ok(ct)
    }

    /// Read a record and rebuild its tree, bypassing the cache.
    fn fetch(&self, root: &Digest) -> Result<CachedTree, ServiceError> {
        let record = self
            .retry
            .run("get", || self.store.get(root))?
            .ok_or(ServiceError::NotFound(*root))?;
        let corrupt = |reason: String| StoreError::Corrupt { name: root.to_hex(), reason };
        let tree: MerkleTree =
            MerkleTree::build(record.leaves.as_slice()).map_err(|e| corrupt(e.to_string()))?;
        if tree.root() != *root {
            return Err(corrupt(format!("rebuilds to {}", tree.root())).into());
        }
        Ok(CachedTree { record, tree })
    }
}

/// Every leaf whose address field equals `addr`. Identical leaves collapse
/// to the first; distinct ones make the query ambiguous.
fn resolve_address(record: &TreeRecord, addr: &Address) -> Result<usize, ServiceError> {
    let types = record.descriptor();
    let encoding = record.encoding();
    let hits: Vec<usize> = record
        .leaves
        .iter()
        .enumerate()
        .filter(|(_, l)| address_of(l.as_slice(), &types, encoding).as_ref() == Some(addr))
        .map(|(i, _)| i)
        .collect();
    let first = *hits.first().ok_or(MerkleError::LeafNotFound)?;
    let mut distinct: Vec<&HexBytes> = hits.iter().map(|i| &record.leaves[*i]).collect();
    distinct.sort_by(|a, b| a.as_slice().cmp(b.as_slice()));
    distinct.dedup();
    if distinct.len() > 1 {
        return Err(ServiceError::AmbiguousAddress { address: *addr, count: distinct.len() });
    }
    Ok(first)
}
