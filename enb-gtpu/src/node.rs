use crate::control::{GtpuHandle, NodeEndpoint, StackTask};
use crate::endpoint::{GtpuCounters, ReceivePipeline, create_gtpu_socket, dump_stats};
use crate::tunnels::TunnelManager;
use crate::{Config, GtpuEndpoint, PdcpInterface};
use anyhow::Result;
use async_channel::{Receiver, Sender};
use async_std::task::{self, JoinHandle};
use slog::{Logger, info, o};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use stop_token::prelude::*;
use stop_token::{StopSource, StopToken};

// Datagrams and control calls waiting for the stack-processing task.
const STACK_QUEUE_DEPTH: usize = 4096;

/// A running GTP-U user plane: socket, tunnel manager and the tasks that drive them.
pub struct GtpuNode<P> {
    handle: GtpuHandle<P>,
    local_addr: SocketAddr,
    stop_source: StopSource,
    io_tasks: Vec<JoinHandle<()>>,
    processing_task: JoinHandle<()>,
    logger: Logger,
}

impl<P: PdcpInterface + Send + 'static> GtpuNode<P> {
    pub async fn start(config: Config, pdcp: P, logger: Logger) -> Result<Self> {
        config.validate()?;

        let socket = create_gtpu_socket(config.local_ip, config.gtpu_port, &logger)?;
        let local_addr = socket.local_addr()?;
        // Shares the receive socket's non-blocking mode, see the DatagramSink impl.
        let tx_socket = socket.try_clone()?;

        let counters = Arc::new(GtpuCounters::default());
        let manager = TunnelManager::new(&config, pdcp, &logger.new(o!("gtpu" => "tunnels")));
        let endpoint = GtpuEndpoint::new(manager, tx_socket, counters.clone(), &logger);

        let (sender, receiver) = async_channel::bounded(STACK_QUEUE_DEPTH);
        let stop_source = StopSource::new();

        let receive_task = ReceivePipeline::new(socket.into(), sender.clone(), counters.clone())
            .run(stop_source.token(), logger.clone());
        let ticker_task = task::spawn(run_ticker(
            sender.clone(),
            config.tick_interval_msec,
            stop_source.token(),
        ));
        let stats_task = task::spawn(dump_stats(
            logger.clone(),
            counters,
            stop_source.token(),
        ));
        let processing_task = task::spawn(process_stack_tasks(
            endpoint,
            receiver,
            config.tick_interval_msec,
            logger.clone(),
        ));

        info!(
            &logger,
            "GTP-U stack started on {} with room for {} tunnels",
            local_addr,
            config.tunnel_pool_size()
        );
        Ok(GtpuNode {
            handle: GtpuHandle::new(sender),
            local_addr,
            stop_source,
            io_tasks: vec![receive_task, ticker_task, stats_task],
            processing_task,
            logger,
        })
    }

    pub fn handle(&self) -> GtpuHandle<P> {
        self.handle.clone()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn graceful_shutdown(self) {
        info!(&self.logger, "Shutting down");
        drop(self.stop_source);
        for t in self.io_tasks {
            t.await;
        }
        let _ = self.handle.sender.send(StackTask::Shutdown).await;
        self.processing_task.await;
    }
}

async fn run_ticker<P>(sender: Sender<StackTask<P>>, interval_msec: u64, stop_token: StopToken) {
    loop {
        if task::sleep(Duration::from_millis(interval_msec))
            .timeout_at(stop_token.clone())
            .await
            .is_err()
        {
            break;
        }
        if sender.send(StackTask::Tick).await.is_err() {
            break;
        }
    }
}

async fn process_stack_tasks<P: PdcpInterface>(
    mut endpoint: NodeEndpoint<P>,
    receiver: Receiver<StackTask<P>>,
    tick_interval_msec: u64,
    logger: Logger,
) {
    while let Ok(stack_task) = receiver.recv().await {
        match stack_task {
            StackTask::Datagram { bytes, peer } => endpoint.handle_rx_packet(&bytes, peer),
            StackTask::Tick => endpoint.tick(tick_interval_msec),
            StackTask::Call(f) => f(&mut endpoint),
            StackTask::Shutdown => break,
        }
    }
    info!(
        logger,
        "GTP-U stack stopped with {} tunnels",
        endpoint.manager().len()
    );
}
