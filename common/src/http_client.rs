use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CastError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

fn agent() -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(REQUEST_TIMEOUT))
        .build();
    ureq::Agent::new_with_config(config)
}

/// `POST` a JSON body to `url`. Any transport or status failure is reported
/// as [`CastError::HostUnreachable`].
pub async fn post_json<T>(url: String, body: T) -> Result<()>
where
    T: Serialize + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        agent()
            .post(&url)
            .send_json(&body)
            .map(|_| ())
            .map_err(|err| anyhow!(CastError::HostUnreachable(format!("{url} ({err})"))))
    })
    .await?
}

pub async fn get_json<T>(url: String) -> Result<T>
where
    T: DeserializeOwned + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut response = agent()
            .get(&url)
            .call()
            .map_err(|err| anyhow!(CastError::HostUnreachable(format!("{url} ({err})"))))?;
        Ok(response.body_mut().read_json::<T>()?)
    })
    .await?
}
