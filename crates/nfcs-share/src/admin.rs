//! Read-only summaries for the admin views: every file, every access, and
//! every principal that appears in a record.

use std::collections::BTreeMap;

use nfcs_core::{AccessLogEntry, EncryptedFileRecord, NfcsResult};

use crate::Stores;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalSummary {
    pub email: String,
    /// Partitions assigned to this principal across all files
    pub assigned_partitions: usize,
    /// Files this principal encrypted
    pub files_created: usize,
}

/// One entry per principal, sorted by email.
pub fn principal_summary(records: &[EncryptedFileRecord]) -> Vec<PrincipalSummary> {
    let mut by_email: BTreeMap<&str, PrincipalSummary> = BTreeMap::new();
    for record in records {
        summary_for(&mut by_email, &record.created_by).files_created += 1;
        for p in &record.partitions {
            summary_for(&mut by_email, &p.user_email).assigned_partitions += 1;
        }
    }
    by_email.into_values().collect()
}

fn summary_for<'a, 'b>(
    by_email: &'b mut BTreeMap<&'a str, PrincipalSummary>,
    email: &'a str,
) -> &'b mut PrincipalSummary {
    by_email.entry(email).or_insert_with(|| PrincipalSummary {
        email: email.to_string(),
        assigned_partitions: 0,
        files_created: 0,
    })
}

pub async fn list_files(stores: &Stores) -> NfcsResult<Vec<EncryptedFileRecord>> {
    stores.records.list().await
}

pub async fn list_access_logs(stores: &Stores) -> NfcsResult<Vec<AccessLogEntry>> {
    stores.logs.list().await
}

pub async fn list_principals(stores: &Stores) -> NfcsResult<Vec<PrincipalSummary>> {
    Ok(principal_summary(&stores.records.list().await?))
}
