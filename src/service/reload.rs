use std::{fmt, str::FromStr};

use tracing::{debug, instrument, warn};

use super::{step, Provisioner, ServiceError};
use crate::access::Backend;

/// How a changed server config is applied to the running interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadStrategy {
    /// `wg syncconf`, keeps existing sessions. Falls back to `Restart` when it fails.
    Sync,
    /// `wg-quick down` followed by `wg-quick up`.
    Restart,
}

impl ReloadStrategy {
    pub fn default_for(backend: Backend) -> Self {
        match backend {
            Backend::Remote => Self::Sync,
            Backend::Local => Self::Restart,
        }
    }
}

impl FromStr for ReloadStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync" => Ok(Self::Sync),
            "restart" => Ok(Self::Restart),
            unsupported => Err(format!(
                "unsupported reload strategy {unsupported} (supported: sync, restart)"
            )),
        }
    }
}

impl fmt::Display for ReloadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReloadStrategy::Sync => "sync",
            ReloadStrategy::Restart => "restart",
        })
    }
}

impl Provisioner {
    #[instrument(skip(self))]
    pub(super) async fn reload(&self) -> Result<(), ServiceError> {
        let iface = &self.interface;

        if self.reload == ReloadStrategy::Sync {
            let status = self
                .access
                .run_command(&format!("wg syncconf {iface} <(wg-quick strip {iface})"))
                .await
                .map_err(step("reload interface"))?;
            if status == 0 {
                return Ok(());
            }
            warn!("wg syncconf {iface} exited with {status}, restarting the interface instead");
        }

        // it may not be up
        let status = self
            .access
            .run_command(&format!("wg-quick down {iface}"))
            .await
            .map_err(step("stop interface"))?;
        if status != 0 {
            debug!("wg-quick down {iface} exited with {status}");
        }

        let status = self
            .access
            .run_command(&format!("wg-quick up {iface}"))
            .await
            .map_err(step("start interface"))?;
        if status != 0 {
            return Err(ServiceError::Provisioning(format!(
                "wg-quick up {iface} exited with status {status}"
            )));
        }

        Ok(())
    }
}
