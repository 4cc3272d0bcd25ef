use widget_federation::expose;

#[expose(module = "./Widget")]
pub struct Clock;

fn main() {
    let _ = Clock;
}
