use widget_federation::expose;

#[expose(container = "holder")]
pub struct Holder<const N: usize>;

fn main() {
    let _ = Holder::<1>;
}
