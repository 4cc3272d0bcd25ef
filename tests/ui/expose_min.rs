use widget_federation::prelude::*;

#[widget_federation::expose(container = "clock_widget")]
pub struct Clock {
    bus: BusHandle,
}

impl Mountable for Clock {
    fn mount(props: WidgetProps) -> anyhow::Result<Self> {
        Ok(Self {
            bus: props.event_bus,
        })
    }
}

impl Widget for Clock {
    fn name(&self) -> &str {
        "clock_widget"
    }
    fn unmount(&mut self) {}
    fn interact(&mut self, _input: &str) -> anyhow::Result<()> {
        self.bus.emit("clock:tick", EventPayload::now("tick"));
        Ok(())
    }
}

fn main() {
    let registry = ContainerRegistry::discover();
    assert!(registry.exposes("clock_widget", "./Widget"));
}
