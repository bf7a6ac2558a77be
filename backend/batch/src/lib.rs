//! # Batch Accounts
//!
//! Administrators pre-create accounts that get printed onto physical NFC/QR
//! cards. Each card carries a username, a one-time password and a QR code
//! pointing at the public profile.
//!
//! ## Flow
//!
//! 1. For each requested account, pick `<prefix><6 random chars>` and check it is free.
//!    Give up on that account after [`USERNAME_ATTEMPTS`] taken candidates.
//! 2. Generate a password, hash it, insert the user flagged `is_batch_generated`.
//! 3. Encode the profile URL as a QR PNG.
//! 4. Record the outcome and move on. A failed account never stops the batch.
//!
//! Inserts run one after another inside the caller's task, at most [`MAX_BATCH`] per run.
//!
//! ## Archive
//!
//! [`archive`] packs a report into a zip: `qr/<username>.png` per account,
//! `accounts.csv` and a `README.txt` for whoever prints the cards.
use std::io::{Cursor, Write};

use store::{NewUser, Store};
use tracing::{info, warn};
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

pub mod error;
pub mod models;
pub mod qr;
pub mod utils;

pub use error::BatchError;
pub use models::{
    BatchItem, BatchReport, BatchRequest, BatchSettings, GeneratedAccount, MAX_BATCH,
    USERNAME_ATTEMPTS,
};
use qr::qr_png;
use utils::{csv_field, profile_url, random_password, random_username, sanitize_prefix};

pub async fn generate<F>(
    store: &dyn Store,
    request: &BatchRequest,
    settings: &BatchSettings,
    on_item: F,
) -> Result<BatchReport, BatchError>
where
    F: FnMut(&BatchItem) + Send,
{
    generate_with(store, request, settings, random_username, on_item).await
}

async fn generate_with<N, F>(
    store: &dyn Store,
    request: &BatchRequest,
    settings: &BatchSettings,
    mut candidate: N,
    mut on_item: F,
) -> Result<BatchReport, BatchError>
where
    N: FnMut(&str) -> String + Send,
    F: FnMut(&BatchItem) + Send,
{
    if request.count == 0 || request.count > MAX_BATCH {
        return Err(BatchError::InvalidCount {
            count: request.count,
            max: MAX_BATCH,
        });
    }

    let prefix = sanitize_prefix(request.prefix.as_deref().unwrap_or_default());
    let mut report = BatchReport::new(request.count);

    for index in 0..request.count {
        let item = match create_account(store, settings, &prefix, index, &mut candidate).await {
            Ok(account) => BatchItem::Created(account),
            Err(error) => {
                warn!("Batch account {index} failed: {error}");
                BatchItem::Failed { index, error }
            }
        };

        on_item(&item);
        report.push(item);
    }

    info!(
        "Batch finished: {} created, {} failed",
        report.created, report.failed
    );

    Ok(report)
}

async fn create_account<N>(
    store: &dyn Store,
    settings: &BatchSettings,
    prefix: &str,
    index: usize,
    candidate: &mut N,
) -> Result<GeneratedAccount, String>
where
    N: FnMut(&str) -> String + Send,
{
    let username = free_username(store, prefix, candidate).await?;
    let password = random_password();
    let password_hash = store::password::hash(&password).await.map_err(|e| e.to_string())?;

    let user = store
        .create_user(NewUser {
            username: username.clone(),
            password_hash,
            full_name: None,
            is_batch_generated: true,
        })
        .await
        .map_err(|e| format!("{username}: {e}"))?;

    let profile_url = profile_url(&settings.site_url, &user.username);
    let qr_png = qr_png(&profile_url).map_err(|e| format!("{username}: {e}"))?;

    Ok(GeneratedAccount {
        index,
        user_id: user.id,
        username: user.username,
        password,
        profile_url,
        qr_png,
    })
}

async fn free_username<N>(store: &dyn Store, prefix: &str, candidate: &mut N) -> Result<String, String>
where
    N: FnMut(&str) -> String + Send,
{
    for _ in 0..USERNAME_ATTEMPTS {
        let username = candidate(prefix);

        match store.username_exists(&username).await {
            Ok(false) => return Ok(username),
            Ok(true) => continue,
            Err(e) => return Err(e.to_string()),
        }
    }

    Err(format!(
        "no free username after {USERNAME_ATTEMPTS} attempts"
    ))
}

pub fn accounts_csv(report: &BatchReport) -> String {
    let mut csv = String::from("username,password,profile_url\n");

    for account in report.accounts() {
        csv.push_str(&format!(
            "{},{},{}\n",
            csv_field(&account.username),
            csv_field(&account.password),
            csv_field(&account.profile_url)
        ));
    }

    csv
}

pub fn readme(report: &BatchReport) -> String {
    let mut readme = format!(
        "Board Iraq batch accounts\n\
         =========================\n\n\
         Generated: {}\n\
         Requested: {}\n\
         Created:   {}\n\
         Failed:    {}\n\n\
         Contents\n\
         - accounts.csv: username, password and profile URL for every created account\n\
         - qr/<username>.png: QR code pointing at the account's public profile\n\n\
         Print one card per row of accounts.csv with the matching QR code.\n\
         Owners sign in with the printed username and password and should change\n\
         the password after their first login. Keep this archive private.\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.requested,
        report.created,
        report.failed,
    );

    let failures: Vec<String> = report
        .failures()
        .map(|(index, error)| format!("- #{index}: {error}"))
        .collect();

    if !failures.is_empty() {
        readme.push_str("\nFailures\n");
        readme.push_str(&failures.join("\n"));
        readme.push('\n');
    }

    readme
}

/// Zips the report for download.
pub fn archive(report: &BatchReport) -> Result<Vec<u8>, BatchError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("accounts.csv", options)?;
    zip.write_all(accounts_csv(report).as_bytes())?;

    zip.start_file("README.txt", options)?;
    zip.write_all(readme(report).as_bytes())?;

    for account in report.accounts() {
        // already compressed
        zip.start_file(
            format!("qr/{}.png", account.username),
            options.compression_method(CompressionMethod::Stored),
        )?;
        zip.write_all(&account.qr_png)?;
    }

    Ok(zip.finish()?.into_inner())
}
