// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! oltd HTTP API types and endpoint functions.

use std::collections::HashMap;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::SocketAddr;
use std::sync::Arc;

use dropshot::endpoint;
use dropshot::HttpError;
use dropshot::HttpResponseCreated;
use dropshot::HttpResponseDeleted;
use dropshot::HttpResponseOk;
use dropshot::HttpResponseUpdatedNoContent;
use dropshot::Path;
use dropshot::RequestContext;
use dropshot::TypedBody;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use slog::error;
use slog::info;
use slog::o;

use crate::config::DeviceConfig;
use crate::errors::OltdError;
use crate::poller;
use crate::types::OntRecord;
use crate::types::PollCycleResult;
use crate::Global;

type ApiServer = dropshot::HttpServer<Arc<Global>>;

/// Build information about `oltd`.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
pub struct BuildInfo {
    pub version: String,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// A monitored device as reported by the API.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
pub struct Device {
    pub name: String,
    pub host: String,
    pub sys_descr: String,
    pub hardware: String,
    pub stats: poller::Stats,
    /// Summary of the most recent completed poll cycle, if any.
    pub last_result: Option<PollCycleResult>,
}

/// Optional arguments when adding a device to oltd.  Any argument left
/// unspecified is assigned the deployment defaults.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
pub struct DeviceAdd {
    pub host: String,
    pub community: Option<String>,
    pub sys_descr: Option<String>,
    pub hardware: Option<String>,
    pub poll_interval_secs: Option<u64>,
}

#[derive(Deserialize, Serialize, JsonSchema)]
struct DevicePathParams {
    /// The device on which to operate.
    device: String,
}

fn device_view(name: &str, device: &poller::Device) -> Device {
    Device {
        name: name.to_string(),
        host: device.identity.host.clone(),
        sys_descr: device.identity.sys_descr.clone(),
        hardware: device.identity.hardware.clone(),
        stats: device.stats,
        last_result: device.last_result.clone(),
    }
}

#[endpoint {
    method = PUT,
    path = "/device/{device}",
}]
async fn device_add(
    rqctx: RequestContext<Arc<Global>>,
    path: Path<DevicePathParams>,
    params: TypedBody<DeviceAdd>,
) -> Result<HttpResponseCreated<()>, HttpError> {
    let global: &Arc<Global> = rqctx.context();
    let name = path.into_inner().device;
    let params = params.into_inner();
    let cfg = DeviceConfig {
        name,
        host: params.host,
        community: params.community.unwrap_or_else(|| "public".to_string()),
        sys_descr: params.sys_descr.unwrap_or_default(),
        hardware: params.hardware.unwrap_or_default(),
        poll_interval_secs: params.poll_interval_secs,
    };
    poller::device_add(global, cfg)
        .await
        .map(HttpResponseCreated)
        .map_err(|e| e.into())
}

#[endpoint {
    method = DELETE,
    path = "/device/{device}",
}]
async fn device_del(
    rqctx: RequestContext<Arc<Global>>,
    path: Path<DevicePathParams>,
) -> Result<HttpResponseDeleted, HttpError> {
    let global: &Arc<Global> = rqctx.context();
    let name = path.into_inner().device;
    poller::device_remove(global, name)
        .await
        .map(|_| HttpResponseDeleted())
        .map_err(|e| e.into())
}

#[endpoint {
    method = GET,
    path = "/device/{device}",
}]
async fn device_get(
    rqctx: RequestContext<Arc<Global>>,
    path: Path<DevicePathParams>,
) -> Result<HttpResponseOk<Device>, HttpError> {
    let global: &Global = rqctx.context();
    let name = path.into_inner().device;

    Ok(HttpResponseOk(
        global
            .devices
            .lock()
            .unwrap()
            .get(&name)
            .ok_or_else(|| {
                OltdError::Missing(format!("no such device: {name}"))
            })
            .map(|device| device_view(&name, &device.lock().unwrap()))?,
    ))
}

#[endpoint {
    method = GET,
    path = "/device",
}]
async fn device_list(
    rqctx: RequestContext<Arc<Global>>,
) -> Result<HttpResponseOk<Vec<Device>>, HttpError> {
    let global: &Global = rqctx.context();
    Ok(HttpResponseOk(
        global
            .devices
            .lock()
            .unwrap()
            .iter()
            .map(|(name, device)| device_view(name, &device.lock().unwrap()))
            .collect(),
    ))
}

/// Return the ONT records currently known for a device.
#[endpoint {
    method = GET,
    path = "/device/{device}/onts",
}]
async fn ont_list(
    rqctx: RequestContext<Arc<Global>>,
    path: Path<DevicePathParams>,
) -> Result<HttpResponseOk<Vec<OntRecord>>, HttpError> {
    let global: &Global = rqctx.context();
    let name = path.into_inner().device;

    if !global.devices.lock().unwrap().contains_key(&name) {
        return Err(
            OltdError::Missing(format!("no such device: {name}")).into()
        );
    }
    Ok(HttpResponseOk(
        global.store.device_onts(&name).into_values().collect(),
    ))
}

/// Ask a device's poll loop to run a cycle immediately, rather than
/// waiting for the next interval.
#[endpoint {
    method = POST,
    path = "/device/{device}/poll",
}]
async fn device_poll(
    rqctx: RequestContext<Arc<Global>>,
    path: Path<DevicePathParams>,
) -> Result<HttpResponseUpdatedNoContent, HttpError> {
    let global: &Global = rqctx.context();
    let name = path.into_inner().device;
    poller::poll_now(global, &name)
        .await
        .map(|_| HttpResponseUpdatedNoContent())
        .map_err(|e| e.into())
}

/// Return build information about the `oltd` server itself.
#[endpoint {
    method = GET,
    path = "/build-info",
}]
async fn build_info(
    _rqctx: RequestContext<Arc<Global>>,
) -> Result<HttpResponseOk<BuildInfo>, HttpError> {
    Ok(HttpResponseOk(BuildInfo::default()))
}

pub fn http_api() -> dropshot::ApiDescription<Arc<Global>> {
    let mut api = dropshot::ApiDescription::new();

    api.register(build_info).unwrap();
    api.register(device_add).unwrap();
    api.register(device_del).unwrap();
    api.register(device_get).unwrap();
    api.register(device_list).unwrap();
    api.register(ont_list).unwrap();
    api.register(device_poll).unwrap();

    api
}

fn launch_server(
    global: Arc<Global>,
    addr: &SocketAddr,
    id: u32,
) -> anyhow::Result<ApiServer> {
    let config_dropshot = dropshot::ConfigDropshot {
        bind_address: *addr,
        request_body_max_bytes: 10240,
        default_handler_task_mode: dropshot::HandlerTaskMode::Detached,
    };
    let log = global
        .log
        .new(o!("unit" => "api-server", "server_id" => id.to_string()));

    slog::info!(log, "starting api server {id} on {addr}");
    dropshot::HttpServerStarter::new(
        &config_dropshot,
        http_api(),
        global.clone(),
        &log,
    )
    .map(|s| s.start())
    .map_err(|e| anyhow::anyhow!(e.to_string()))
}

// Manage the set of api servers currently listening for requests.  The
// population is the configured listen addresses plus localhost; when the
// shutdown channel closes, every active server is drained.
pub async fn api_server_manager(
    global: Arc<Global>,
    mut shutdown_rx: tokio::sync::watch::Receiver<()>,
) {
    let mut active = HashMap::<SocketAddr, ApiServer>::new();
    let mut id = 0;
    let mut running = true;

    let log = global.log.new(o!("unit" => "api-server-manager"));
    while running {
        let active_addrs = active.keys().cloned().collect::<Vec<SocketAddr>>();
        let mut config_addrs = global.listen_addresses.lock().unwrap().to_vec();
        // We always listen on localhost
        config_addrs.push(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            common::DEFAULT_OLTD_PORT,
        ));
        // Get the list of all the addresses we should be listening on,
        // and compare it to the list we currently are listening on.
        let (add, remove) = common::purge_common(&config_addrs, &active_addrs);

        for addr in remove {
            let hdl = active.remove(&addr).unwrap();
            info!(log, "closing api server on {addr}");
            if let Err(e) = hdl.close().await {
                error!(log, "error closing api server on {addr}: {e:?}");
            }
        }

        for addr in &add {
            // Increase the `id` to give each server a unique name
            id += 1;
            match launch_server(global.clone(), addr, id) {
                Ok(s) => {
                    active.insert(*addr, s);
                }
                Err(e) => {
                    error!(
                        log,
                        "failed to launch api server {id} on {addr}: {e:?}"
                    );
                }
            };
        }

        // When the tx side is dropped, the changed() below will return
        // an error, telling us that it is time to exit.
        running = shutdown_rx.changed().await.is_ok();
    }

    // Shut down all the active API servers
    for (addr, hdl) in active {
        info!(log, "closing api server on {addr}");
        if let Err(e) = hdl.close().await {
            error!(log, "error closing api server on {addr}: {e:?}");
        }
    }
}
