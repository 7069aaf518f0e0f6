//! Hosted driver.
//!
//! On a microcontroller the application calls `on_tick` from its main loop.
//! Hosted builds (simulations, gateways) use [`run`] instead, which ticks a
//! [`Device`] from a tokio interval until shutdown is signalled.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use wavemesh_interfaces::Radio;
use wavemesh_protocol::{AppHooks, Tick};

use crate::context::DeviceContext;
use crate::messaging::MessageCoordinator;
use crate::settings::SettingsStore;

/// Default tick period for hosted devices.
pub const DEFAULT_TICK_MS: u32 = 5;

/// A device context together with its message coordinator.
pub struct Device<R, S, H> {
    pub ctx: DeviceContext<R>,
    pub messages: MessageCoordinator<S, H>,
}

impl<R: Radio, S: SettingsStore, H: AppHooks> Device<R, S, H> {
    pub fn new(ctx: DeviceContext<R>, messages: MessageCoordinator<S, H>) -> Self {
        Self { ctx, messages }
    }

    pub fn tick(&mut self, now: Tick) {
        self.messages.on_tick(&mut self.ctx, now);
    }
}

/// Signals every [`run`] loop holding a matching receiver to stop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                tx: std::sync::Arc::new(tx),
            },
            rx,
        )
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// Tick `device` every `tick_ms` milliseconds until `shutdown` turns true or
/// its sender is dropped. Returns the number of ticks run.
///
/// The device clock starts at zero when the loop starts and wraps like any
/// other [`Tick`].
pub async fn run<R, S, H>(
    device: &mut Device<R, S, H>,
    tick_ms: u32,
    mut shutdown: watch::Receiver<bool>,
) -> u64
where
    R: Radio,
    S: SettingsStore,
    H: AppHooks,
{
    let period = Duration::from_millis(u64::from(tick_ms.max(1)));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let start = Instant::now();
    let mut ticks = 0u64;

    if *shutdown.borrow() {
        return ticks;
    }
    tracing::info!(did = %device.ctx.did(), tick_ms, "driver: running");

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!(did = %device.ctx.did(), ticks, "driver: shutdown");
                    break;
                }
            }

            _ = interval.tick() => {
                // Wraps after ~49 days, as the device clock does.
                let now = Tick::from_millis(start.elapsed().as_millis() as u32);
                device.tick(now);
                ticks += 1;
            }
        }
    }
    ticks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::directory::Target;
    use crate::messaging::{Destinations, MessageClass};
    use crate::settings::MemoryStore;
    use wavemesh_core::{Did, Pattern, UnitId};
    use wavemesh_interfaces::{SimMedium, SimRadio};
    use wavemesh_protocol::{Delivery, Outcome};

    #[derive(Debug, Default)]
    struct Recorder {
        delivered: Vec<Delivery>,
        outcomes: Vec<Outcome>,
    }

    impl AppHooks for Recorder {
        fn on_message_delivered(&mut self, delivery: &Delivery) {
            self.delivered.push(delivery.clone());
        }

        fn on_transaction_outcome(&mut self, outcome: &Outcome) {
            self.outcomes.push(outcome.clone());
        }
    }

    const KEYS: &str = r#"
[network]
nid = 0x1234
network_key = "00112233445566778899aabbccddeeff"
access_key = "ffeeddccbbaa99887766554433221100"
"#;

    fn device(medium: &SimMedium, device_toml: &str) -> Device<SimRadio, MemoryStore, Recorder> {
        let config = NodeConfig::parse(&format!("{device_toml}\n{KEYS}")).unwrap();
        let (ctx, messages) =
            MessageCoordinator::boot(medium.attach(), &config, MemoryStore::new(), Recorder::default())
                .unwrap();
        Device::new(ctx, messages)
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let medium = SimMedium::new();
        let mut member = device(&medium, "[device]\ndid = 3\nserial = 30");
        let (handle, rx) = ShutdownHandle::new();

        let ticks = tokio::join!(run(&mut member, 10, rx), async {
            tokio::time::sleep(Duration::from_millis(1000)).await;
            handle.trigger();
        })
        .0;
        assert!((90..=110).contains(&ticks), "ran {ticks} ticks");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_immediately_when_already_shut_down() {
        let medium = SimMedium::new();
        let mut member = device(&medium, "[device]\ndid = 3\nserial = 30");
        let (handle, rx) = ShutdownHandle::new();
        handle.trigger();
        assert_eq!(run(&mut member, 10, rx).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_devices_exchange_a_message() {
        let medium = SimMedium::new();
        let mut coordinator = device(&medium, "[device]\nrole = \"coordinator\"\nserial = 1");
        let mut member = device(&medium, "[device]\ndid = 3\nserial = 30");

        let handles = member
            .messages
            .enqueue(
                &mut member.ctx,
                UnitId(1),
                MessageClass::Single,
                b"ping",
                Destinations::Direct {
                    pattern: Pattern(2),
                    targets: vec![Target {
                        did: Did::COORDINATOR,
                        unit: UnitId(4),
                    }],
                },
            )
            .unwrap();
        assert_eq!(handles.len(), 1);

        let (handle, rx) = ShutdownHandle::new();
        tokio::join!(
            run(&mut coordinator, 5, rx.clone()),
            run(&mut member, 5, rx),
            async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                handle.trigger();
            }
        );

        let delivered = &coordinator.messages.hooks().delivered;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].data, b"ping");
        assert_eq!(delivered[0].from, Did(3));
        assert_eq!(delivered[0].dst_unit, UnitId(4));

        let outcomes = &member.messages.hooks().outcomes;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].tx, handles[0]);
        assert_eq!(outcomes[0].result, Ok(None));
    }
}
