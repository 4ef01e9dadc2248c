use std::{convert::Infallible, path::PathBuf, process};

use clap::Parser;
use embassy_executor::{Executor, Spawner};
use embassy_net::{Config, Ipv4Address, Ipv4Cidr, Runner, Stack, StackResources};
use embassy_net_tuntap::TunTapDevice;
use embedded_hal::{digital, pwm};
use flb_core::{
    mk_static,
    utils::{
        controllers::{MotorDriver, RobotConfig, ServoDriver},
        wss, Duration, SystemController, Timer,
    },
};
use heapless::Vec;
use rand_core::{OsRng, TryRngCore};
use static_cell::StaticCell;
use tracing::{error, info, trace};

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts {
    /// TAP device name
    #[clap(long, default_value = "tap0")]
    tap: String,
    /// use a static IP instead of DHCP
    #[clap(long)]
    static_ip: bool,
    /// port the operator WebSocket listens on
    #[clap(long, default_value_t = 8000)]
    port: u16,
    /// JSON file overriding the default calibration
    #[clap(long)]
    config: Option<PathBuf>,
}

/// PWM line that logs duty changes instead of driving hardware.
struct LoggedPwm {
    name: &'static str,
    duty: Option<u16>,
}

impl LoggedPwm {
    fn new(
        name: &'static str,
        freq_hz: u32,
    ) -> Self {
        info!(line = name, freq_hz, "PWM line configured");
        Self { name, duty: None }
    }
}

impl pwm::ErrorType for LoggedPwm {
    type Error = Infallible;
}

impl pwm::SetDutyCycle for LoggedPwm {
    fn max_duty_cycle(&self) -> u16 {
        u16::MAX
    }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), Self::Error> {
        if self.duty != Some(duty) {
            trace!(line = self.name, duty, "duty");
            self.duty = Some(duty);
        }
        Ok(())
    }
}

/// Digital line that logs level changes instead of driving hardware.
struct LoggedPin {
    name: &'static str,
    high: Option<bool>,
}

impl LoggedPin {
    fn new(name: &'static str) -> Self {
        Self { name, high: None }
    }

    fn write(
        &mut self,
        high: bool,
    ) {
        if self.high != Some(high) {
            trace!(line = self.name, high, "level");
            self.high = Some(high);
        }
    }
}

impl digital::ErrorType for LoggedPin {
    type Error = Infallible;
}

impl digital::OutputPin for LoggedPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write(true);
        Ok(())
    }
}

type Controller = SystemController<LoggedPwm, LoggedPin, LoggedPwm>;

/// Wire the logged lines the way the Pico W board is wired: ENA/IN1/IN2 on
/// the left, ENB/IN3/IN4 on the right (forward on IN2/IN4), the lift servo
/// on GP1 and the on-board LED as the status light.
fn build_controller(config: &RobotConfig) -> Result<Controller, String> {
    config.validate().map_err(|e| e.to_string())?;

    let left = MotorDriver::new(
        LoggedPwm::new("ENA(GP8)", config.left_motor.pwm_freq),
        LoggedPin::new("IN2(GP10)"),
        LoggedPin::new("IN1(GP9)"),
        config.left_motor,
    )
    .map_err(|e| e.to_string())?;
    let right = MotorDriver::new(
        LoggedPwm::new("ENB(GP13)", config.right_motor.pwm_freq),
        LoggedPin::new("IN4(GP12)"),
        LoggedPin::new("IN3(GP11)"),
        config.right_motor,
    )
    .map_err(|e| e.to_string())?;
    let lift = ServoDriver::new(LoggedPwm::new("SERVO(GP1)", config.lift.pwm_freq), config.lift)
        .map_err(|e| format!("{e:?}"))?;

    let status = LoggedPin::new("LED");

    SystemController::new(left, right, lift, Some(status), config.control)
        .map_err(|e| e.to_string())
}

fn load_config(path: Option<&PathBuf>) -> Result<RobotConfig, String> {
    let Some(path) = path else {
        return Ok(RobotConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid config {}: {e}", path.display()))
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, TunTapDevice>) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn control_task(mut ctrl: Controller) -> ! {
    ctrl.run().await
}

#[embassy_executor::task]
async fn main_task(
    spawner: Spawner,
    opts: Opts,
    ctrl: Controller,
) {
    spawner.spawn(control_task(ctrl)).unwrap();

    let device = match TunTapDevice::new(&opts.tap) {
        Ok(device) => device,
        Err(e) => {
            error!("cannot open TAP device {}: {}", opts.tap, e);
            process::exit(1);
        }
    };
    let config = if opts.static_ip {
        Config::ipv4_static(embassy_net::StaticConfigV4 {
            address: Ipv4Cidr::new(Ipv4Address::new(192, 168, 69, 2), 24),
            dns_servers: Vec::new(),
            gateway: Some(Ipv4Address::new(192, 168, 69, 1)),
        })
    } else {
        Config::dhcpv4(Default::default())
    };

    let mut seed_buf = [0; 8];
    if let Err(e) = OsRng.try_fill_bytes(&mut seed_buf) {
        error!("OS RNG unavailable, using a fixed seed: {}", e);
    }
    let seed = u64::from_le_bytes(seed_buf);

    let (stack, runner) = embassy_net::new(
        device,
        config,
        mk_static!(StackResources<3>, StackResources::<3>::new()),
        seed,
    );
    spawner.spawn(net_task(runner)).unwrap();

    wait_for_network(&stack).await;

    info!("Starting WebSocket server on port {}", opts.port);
    wss(0, opts.port, stack, None).await;
}

/// Helper function to wait for network connection
async fn wait_for_network(stack: &Stack<'static>) {
    info!("Waiting for network link...");
    loop {
        if stack.is_link_up() {
            break;
        }
        Timer::after(Duration::from_millis(500)).await;
    }

    info!("Waiting to get IP address...");
    loop {
        if let Some(config) = stack.config_v4() {
            info!("Got IP: {}", config.address);
            break;
        }
        Timer::after(Duration::from_millis(500)).await;
    }
}

static EXECUTOR: StaticCell<Executor> = StaticCell::new();

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();
    let ctrl = match load_config(opts.config.as_ref()).and_then(|cfg| build_controller(&cfg)) {
        Ok(ctrl) => ctrl,
        Err(e) => {
            error!("startup failed: {}", e);
            process::exit(1);
        }
    };

    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        spawner.spawn(main_task(spawner, opts, ctrl)).unwrap();
    });
}
