//! Stored procedure calls.

use std::sync::Arc;

use mssql_types::{EncodeOptions, Encoded, ToSql, WireType, codec};
use tds_transport::{RpcParam, Transport};
use tracing::Instrument;

use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::fetch::fetch_results;
use crate::instrumentation;
use crate::param_cache::{ParameterDescriptor, catalog_query, parse_catalog};
use crate::session::Session;
use crate::sp_result::{OutputParam, SpResult};

/// Why binding the parameters of a call stopped.
struct BindFailure {
    error: Error,
    /// At least one parameter had been handed to the transport.
    partial: bool,
}

impl Session {
    /// Call stored procedure `name`.
    ///
    /// Arguments are matched to the procedure's parameters by position; the
    /// parameter list is read from the catalog on the first call and cached.
    /// Output parameters are always bound, with or without an argument.
    ///
    /// ```rust,ignore
    /// let mut result = session.exec_sp("dbo.author_count", &[&"CA", &0i32]).await?;
    /// let mut count = 0i32;
    /// result.param_scan(&mut [&mut count])?;
    /// assert_eq!(result.status(), 0);
    /// ```
    pub async fn exec_sp(
        &mut self,
        name: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<SpResult> {
        let span = instrumentation::procedure_span(&self.credentials, name);
        self.call_procedure(name, params).instrument(span).await
    }

    async fn call_procedure(
        &mut self,
        name: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<SpResult> {
        if self.is_dead() || self.is_mirror_slave().await {
            self.reconnect().await?;
        }

        let descriptors = self.procedure_parameters(name).await?;
        self.diagnostics.clear();

        let diagnostics = Arc::clone(&self.diagnostics);
        let options = self.encode_options;
        let transport = self.transport_mut()?;
        transport
            .init_rpc(name)
            .map_err(|e| diagnostics.server_error(e))?;
        if let Err(failure) = bind_params(transport, &diagnostics, &descriptors, params, options) {
            if failure.partial {
                tracing::warn!(procedure = name, error = %failure.error, "closing session after a failed parameter bind");
                self.close();
            } else {
                transport.reset_rpc();
            }
            return Err(failure.error);
        }

        let transport = self.transport_mut()?;
        let sent = transport.send_rpc().await;
        if let Err(err) = sent {
            let err = diagnostics.server_error(err);
            return Err(self.classify(err));
        }
        let results = fetch_results(transport, &diagnostics).await?;
        let status = transport.return_status().unwrap_or(-1);

        let mut outputs = Vec::new();
        for param in transport.output_params() {
            let wire = WireType::from_code(param.type_code);
            outputs.push(OutputParam {
                name: param.name,
                value: codec::decode_nullable(wire, param.data.as_deref())?,
            });
        }

        tracing::debug!(
            procedure = name,
            result_sets = results.len(),
            status = status,
            outputs = outputs.len(),
            "procedure returned"
        );
        Ok(SpResult::new(results, status, outputs))
    }

    /// Parameters of procedure `name`, from the cache or the catalog.
    pub async fn procedure_parameters(&mut self, name: &str) -> Result<Arc<[ParameterDescriptor]>> {
        if let Some(cached) = self.param_cache.get(name) {
            return Ok(cached);
        }
        let sql = catalog_query(name, &self.credentials.compatibility);
        let results = self.exec_once(&sql).await?;
        let descriptors = parse_catalog(&results)?;
        tracing::debug!(procedure = name, params = descriptors.len(), "read procedure parameters");
        Ok(self.param_cache.insert(name, descriptors))
    }
}

fn bind_params(
    transport: &mut dyn Transport,
    diagnostics: &Diagnostics,
    descriptors: &[ParameterDescriptor],
    params: &[&(dyn ToSql + Sync)],
    options: EncodeOptions,
) -> std::result::Result<(), BindFailure> {
    let mut bound = 0usize;
    for (i, descriptor) in descriptors.iter().enumerate() {
        let arg = params.get(i);
        if arg.is_none() && !descriptor.is_output {
            continue;
        }

        let encoded = match arg {
            Some(arg) => arg
                .to_sql()
                .and_then(|value| codec::encode(descriptor.wire_type, &value, options))
                .map_err(|e| BindFailure {
                    error: e.into(),
                    partial: bound > 0,
                })?,
            None => Encoded {
                data: None,
                declared_len: 0,
            },
        };

        let param = RpcParam {
            name: descriptor.name.clone(),
            output: descriptor.is_output,
            type_code: descriptor.wire_type.code(),
            max_output_len: if descriptor.is_output {
                descriptor.output_len()
            } else {
                -1
            },
            data: encoded.data,
            data_len: encoded.declared_len,
        };
        transport.bind_rpc_param(param).map_err(|e| BindFailure {
            error: diagnostics.server_error(e),
            partial: bound > 0,
        })?;
        bound += 1;
    }
    Ok(())
}
