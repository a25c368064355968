//! RocksDB-backed persistent [`CouponStore`].
//!
//! Column families hold codes (keyed by creation sequence, so an
//! ascending iteration is FIFO order), id and value indexes, claims,
//! administrators, and sequence counters. Multi-key mutations go through
//! an atomic [`WriteBatch`]; read-modify-write mutations additionally
//! serialize on an internal mutex, which is what makes the conditional
//! `mark_claimed` transition atomic.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};

use coupon_core::error::StoreError;
use coupon_core::traits::CouponStore;
use coupon_core::types::{
    Administrator, Claim, ClaimId, Code, CodeId, CodeStatus, NewClaim,
};

// --- Column family names ---

const CF_CODES: &str = "codes";
const CF_CODE_IDS: &str = "code_ids";
const CF_CODE_VALUES: &str = "code_values";
const CF_CLAIMS: &str = "claims";
const CF_ADMINS: &str = "admins";
const CF_METADATA: &str = "metadata";

/// All column family names.
const ALL_CFS: &[&str] = &[
    CF_CODES,
    CF_CODE_IDS,
    CF_CODE_VALUES,
    CF_CLAIMS,
    CF_ADMINS,
    CF_METADATA,
];

// --- Metadata keys ---

const META_NEXT_CODE_SEQ: &[u8] = b"next_code_seq";
const META_NEXT_CLAIM_SEQ: &[u8] = b"next_claim_seq";

/// On-disk representation of a code. Timestamps are unix milliseconds.
#[derive(bincode::Encode, bincode::Decode)]
struct CodeRecord {
    id: [u8; 16],
    value: String,
    claimed: bool,
    claimed_by: Option<String>,
    seq: u64,
    created_at_ms: i64,
}

impl CodeRecord {
    fn from_code(code: &Code) -> Self {
        Self {
            id: *code.id.as_bytes(),
            value: code.value.clone(),
            claimed: code.status == CodeStatus::Claimed,
            claimed_by: code.claimed_by.clone(),
            seq: code.seq,
            created_at_ms: code.created_at.timestamp_millis(),
        }
    }

    fn into_code(self) -> Code {
        Code {
            id: CodeId::from_bytes(self.id),
            value: self.value,
            status: if self.claimed { CodeStatus::Claimed } else { CodeStatus::Available },
            claimed_by: self.claimed_by,
            seq: self.seq,
            created_at: ms_to_datetime(self.created_at_ms),
        }
    }
}

/// On-disk representation of a claim.
#[derive(bincode::Encode, bincode::Decode)]
struct ClaimRecord {
    id: [u8; 16],
    code_id: [u8; 16],
    network_address: String,
    session_id: String,
    timestamp_ms: i64,
}

impl ClaimRecord {
    fn into_claim(self) -> Claim {
        Claim {
            id: ClaimId::from_bytes(self.id),
            code_id: CodeId::from_bytes(self.code_id),
            network_address: self.network_address,
            session_id: self.session_id,
            timestamp: ms_to_datetime(self.timestamp_ms),
        }
    }
}

/// On-disk representation of an administrator.
#[derive(bincode::Encode, bincode::Decode)]
struct AdminRecord {
    username: String,
    credential_hash: String,
}

fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
}

fn encode<T: bincode::Encode>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T, StoreError> {
    let (value, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(value)
}

fn backend(e: rocksdb::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// RocksDB-backed persistent coupon store.
pub struct RocksStore {
    db: DB,
    /// Serializes read-modify-write mutations. Plain reads bypass it.
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create the database at the given path, creating all
    /// column families if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(backend)?;

        Ok(Self { db, write_lock: Mutex::new(()) })
    }

    /// Get a column family handle.
    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Backend(format!("missing column family: {name}")))
    }

    fn get_meta_u64(&self, key: &[u8]) -> Result<u64, StoreError> {
        let cf = self.cf_handle(CF_METADATA)?;
        match self.db.get_cf(&cf, key).map_err(backend)? {
            Some(bytes) if bytes.len() == 8 => {
                Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
            }
            Some(_) => Err(StoreError::Backend("invalid metadata length".into())),
            None => Ok(0),
        }
    }

    /// Allocate the next sequence number for `key`. Caller must hold the
    /// write lock.
    fn next_seq(&self, key: &[u8], batch: &mut WriteBatch) -> Result<u64, StoreError> {
        let seq = self.get_meta_u64(key)?;
        let cf = self.cf_handle(CF_METADATA)?;
        batch.put_cf(cf, key, (seq + 1).to_le_bytes());
        Ok(seq)
    }

    /// Look up a code record and its storage key by id.
    fn code_by_id(&self, code_id: &CodeId) -> Result<Option<([u8; 8], CodeRecord)>, StoreError> {
        let cf_ids = self.cf_handle(CF_CODE_IDS)?;
        let Some(seq_bytes) = self.db.get_cf(&cf_ids, code_id.as_bytes()).map_err(backend)?
        else {
            return Ok(None);
        };
        let seq_key: [u8; 8] = seq_bytes
            .try_into()
            .map_err(|_| StoreError::Backend("invalid code index entry".into()))?;

        let cf_codes = self.cf_handle(CF_CODES)?;
        match self.db.get_cf(&cf_codes, seq_key).map_err(backend)? {
            Some(bytes) => Ok(Some((seq_key, decode(&bytes)?))),
            None => Ok(None),
        }
    }

    /// Iterate all code records in `seq` order.
    fn scan_codes(&self) -> Result<Vec<Code>, StoreError> {
        let cf = self.cf_handle(CF_CODES)?;
        let mut codes = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value_bytes) = item.map_err(backend)?;
            let record: CodeRecord = decode(&value_bytes)?;
            codes.push(record.into_code());
        }
        Ok(codes)
    }

    /// Iterate claim records, newest (highest seq) first when `reverse`.
    fn scan_claims(&self, reverse: bool) -> Result<Vec<Claim>, StoreError> {
        let cf = self.cf_handle(CF_CLAIMS)?;
        let mode = if reverse { IteratorMode::End } else { IteratorMode::Start };
        let mut claims = Vec::new();
        for item in self.db.iterator_cf(&cf, mode) {
            let (_, value_bytes) = item.map_err(backend)?;
            let record: ClaimRecord = decode(&value_bytes)?;
            claims.push(record.into_claim());
        }
        Ok(claims)
    }
}

impl CouponStore for RocksStore {
    fn available_codes(&self) -> Result<Vec<Code>, StoreError> {
        let mut codes = self.scan_codes()?;
        codes.retain(|c| c.status == CodeStatus::Available);
        Ok(codes)
    }

    fn mark_claimed(&self, code_id: &CodeId, claimant: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock();
        let Some((seq_key, mut record)) = self.code_by_id(code_id)? else {
            return Ok(false);
        };
        if record.claimed {
            return Ok(false);
        }
        record.claimed = true;
        record.claimed_by = Some(claimant.to_string());

        let cf = self.cf_handle(CF_CODES)?;
        self.db
            .put_cf(&cf, seq_key, encode(&record)?)
            .map_err(backend)?;
        Ok(true)
    }

    fn insert_claim(&self, claim: NewClaim) -> Result<ClaimId, StoreError> {
        let _guard = self.write_lock.lock();
        let id = ClaimId::generate();
        let record = ClaimRecord {
            id: *id.as_bytes(),
            code_id: *claim.code_id.as_bytes(),
            network_address: claim.network_address,
            session_id: claim.session_id,
            timestamp_ms: claim.timestamp.timestamp_millis(),
        };

        let mut batch = WriteBatch::default();
        let seq = self.next_seq(META_NEXT_CLAIM_SEQ, &mut batch)?;
        let cf = self.cf_handle(CF_CLAIMS)?;
        batch.put_cf(cf, seq.to_be_bytes(), encode(&record)?);
        self.db.write(batch).map_err(backend)?;
        Ok(id)
    }

    fn claims_by_address_since(
        &self,
        address: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Claim>, StoreError> {
        let mut claims = self.scan_claims(false)?;
        claims.retain(|c| c.network_address == address && c.timestamp >= cutoff);
        Ok(claims)
    }

    fn claim_by_session(&self, session_id: &str) -> Result<Option<Claim>, StoreError> {
        Ok(self
            .scan_claims(false)?
            .into_iter()
            .find(|c| c.session_id == session_id))
    }

    fn claims_by_session(&self, session_id: &str) -> Result<Vec<Claim>, StoreError> {
        let mut claims = self.scan_claims(true)?;
        claims.retain(|c| c.session_id == session_id);
        Ok(claims)
    }

    fn insert_code(&self, value: &str) -> Result<Code, StoreError> {
        let _guard = self.write_lock.lock();
        let cf_values = self.cf_handle(CF_CODE_VALUES)?;
        if self
            .db
            .get_cf(&cf_values, value.as_bytes())
            .map_err(backend)?
            .is_some()
        {
            return Err(StoreError::DuplicateValue(value.to_string()));
        }

        let mut batch = WriteBatch::default();
        let seq = self.next_seq(META_NEXT_CODE_SEQ, &mut batch)?;
        let code = Code {
            id: CodeId::generate(),
            value: value.to_string(),
            status: CodeStatus::Available,
            claimed_by: None,
            seq,
            created_at: Utc::now(),
        };
        let record = CodeRecord::from_code(&code);

        let seq_key = seq.to_be_bytes();
        let cf_codes = self.cf_handle(CF_CODES)?;
        let cf_ids = self.cf_handle(CF_CODE_IDS)?;
        batch.put_cf(cf_codes, seq_key, encode(&record)?);
        batch.put_cf(cf_ids, code.id.as_bytes(), seq_key);
        batch.put_cf(cf_values, value.as_bytes(), code.id.as_bytes());
        self.db.write(batch).map_err(backend)?;
        Ok(code)
    }

    fn all_codes(&self) -> Result<Vec<Code>, StoreError> {
        self.scan_codes()
    }

    fn get_code(&self, code_id: &CodeId) -> Result<Option<Code>, StoreError> {
        Ok(self.code_by_id(code_id)?.map(|(_, record)| record.into_code()))
    }

    fn update_code_value(&self, code_id: &CodeId, value: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let (seq_key, mut record) = self
            .code_by_id(code_id)?
            .ok_or(StoreError::CodeNotFound(*code_id))?;

        let cf_values = self.cf_handle(CF_CODE_VALUES)?;
        if let Some(owner) = self
            .db
            .get_cf(&cf_values, value.as_bytes())
            .map_err(backend)?
        {
            if owner.as_slice() != code_id.as_bytes() {
                return Err(StoreError::DuplicateValue(value.to_string()));
            }
        }

        let mut batch = WriteBatch::default();
        batch.delete_cf(cf_values, record.value.as_bytes());
        batch.put_cf(cf_values, value.as_bytes(), code_id.as_bytes());
        record.value = value.to_string();
        let cf_codes = self.cf_handle(CF_CODES)?;
        batch.put_cf(cf_codes, seq_key, encode(&record)?);
        self.db.write(batch).map_err(backend)?;
        Ok(())
    }

    fn toggle_code(&self, code_id: &CodeId) -> Result<CodeStatus, StoreError> {
        let _guard = self.write_lock.lock();
        let (seq_key, mut record) = self
            .code_by_id(code_id)?
            .ok_or(StoreError::CodeNotFound(*code_id))?;

        let new_status = if record.claimed {
            record.claimed = false;
            record.claimed_by = None;
            CodeStatus::Available
        } else {
            record.claimed = true;
            CodeStatus::Claimed
        };

        let cf = self.cf_handle(CF_CODES)?;
        self.db
            .put_cf(&cf, seq_key, encode(&record)?)
            .map_err(backend)?;
        Ok(new_status)
    }

    fn delete_code(&self, code_id: &CodeId) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let (seq_key, record) = self
            .code_by_id(code_id)?
            .ok_or(StoreError::CodeNotFound(*code_id))?;

        let mut batch = WriteBatch::default();
        let cf_codes = self.cf_handle(CF_CODES)?;
        let cf_ids = self.cf_handle(CF_CODE_IDS)?;
        let cf_values = self.cf_handle(CF_CODE_VALUES)?;
        batch.delete_cf(cf_codes, seq_key);
        batch.delete_cf(cf_ids, code_id.as_bytes());
        batch.delete_cf(cf_values, record.value.as_bytes());

        // Cascade: drop every claim referencing this code.
        let cf_claims = self.cf_handle(CF_CLAIMS)?;
        for item in self.db.iterator_cf(&cf_claims, IteratorMode::Start) {
            let (key_bytes, value_bytes) = item.map_err(backend)?;
            let claim: ClaimRecord = decode(&value_bytes)?;
            if claim.code_id == *code_id.as_bytes() {
                batch.delete_cf(cf_claims, key_bytes);
            }
        }

        self.db.write(batch).map_err(backend)?;
        Ok(())
    }

    fn all_claims(&self) -> Result<Vec<Claim>, StoreError> {
        self.scan_claims(true)
    }

    fn find_admin(&self, username: &str) -> Result<Option<Administrator>, StoreError> {
        let cf = self.cf_handle(CF_ADMINS)?;
        match self.db.get_cf(&cf, username.as_bytes()).map_err(backend)? {
            Some(bytes) => {
                let record: AdminRecord = decode(&bytes)?;
                Ok(Some(Administrator {
                    username: record.username,
                    credential_hash: record.credential_hash,
                }))
            }
            None => Ok(None),
        }
    }

    fn insert_admin(&self, admin: Administrator) -> Result<(), StoreError> {
        let record = AdminRecord {
            username: admin.username.clone(),
            credential_hash: admin.credential_hash,
        };
        let cf = self.cf_handle(CF_ADMINS)?;
        self.db
            .put_cf(&cf, admin.username.as_bytes(), encode(&record)?)
            .map_err(backend)?;
        Ok(())
    }

    fn admin_count(&self) -> Result<usize, StoreError> {
        let cf = self.cf_handle(CF_ADMINS)?;
        let mut count = 0;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            item.map_err(backend)?;
            count += 1;
        }
        Ok(count)
    }
}
