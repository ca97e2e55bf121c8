use std::time::Duration;

use log::{debug, warn};
use mongodb::{
    options::{Acknowledgment, ReadConcern, TransactionOptions, WriteConcern},
    Client, ClientSession,
};
use rocket::futures::future::BoxFuture;

use crate::error::{Error, Result};

use super::errors::{is_transient_transaction_error, is_unknown_commit_result};

/// Pause between attempts, multiplied by the attempt number.
const BACKOFF_STEP: Duration = Duration::from_millis(15);

/// Options shared by every transaction: reads see one snapshot and
/// writes are acknowledged by a majority before commit returns.
fn transaction_options() -> TransactionOptions {
    TransactionOptions::builder()
        .read_concern(ReadConcern::snapshot())
        .write_concern(
            WriteConcern::builder()
                .w(Acknowledgment::Majority)
                .build(),
        )
        .build()
}

/// Run `body` inside a transaction and commit it.
///
/// The body is re-run from scratch (up to `max_attempts` times in total)
/// when the store reports a transient transaction error, e.g. a write
/// conflict with a concurrent transaction. Any other error aborts the
/// transaction and is returned as-is; nothing the body wrote becomes visible.
pub async fn with_transaction<T, F>(client: &Client, max_attempts: u32, mut body: F) -> Result<T>
where
    F: for<'s> FnMut(&'s mut ClientSession) -> BoxFuture<'s, Result<T>>,
{
    let mut session = client.start_session(None).await?;
    let mut attempt = 0;
    loop {
        attempt += 1;
        session.start_transaction(transaction_options()).await?;

        let err = match body(&mut session).await {
            Ok(value) => match commit(&mut session, max_attempts).await {
                Ok(()) => return Ok(value),
                Err(err) => err,
            },
            Err(err) => {
                // The server may already have aborted; that is not interesting.
                if let Err(abort_err) = session.abort_transaction().await {
                    debug!("Abort after failed transaction body: {abort_err}");
                }
                err
            }
        };

        match err {
            Error::Db(ref db_err) if is_transient_transaction_error(db_err) => {
                if attempt >= max_attempts {
                    warn!("Transaction still conflicting after {attempt} attempts, giving up");
                    return Err(err);
                }
                debug!("Transient transaction error on attempt {attempt}, retrying: {db_err}");
                rocket::tokio::time::sleep(BACKOFF_STEP * attempt).await;
            }
            err => return Err(err),
        }
    }
}

/// Commit the active transaction, retrying only while the outcome is unknown.
async fn commit(session: &mut ClientSession, max_attempts: u32) -> Result<()> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match session.commit_transaction().await {
            Ok(()) => return Ok(()),
            Err(err) if is_unknown_commit_result(&err) && attempt < max_attempts => {
                debug!("Unknown commit result on attempt {attempt}, retrying commit: {err}");
            }
            Err(err) => return Err(err.into()),
        }
    }
}
