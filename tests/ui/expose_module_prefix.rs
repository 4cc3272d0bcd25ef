use widget_federation::expose;

#[expose(container = "clock", module = "Widget")]
pub struct Clock;

fn main() {
    let _ = Clock;
}
