use std::fmt;

use crate::bus::BusHandle;

/// 组合器提供给模块的唯一输入。
#[derive(Clone, Debug)]
pub struct WidgetProps {
    pub event_bus: BusHandle,
}

/// 已挂载的界面模块。
///
/// 模块自己持有总线登记，必须在 `unmount` 中全部释放；组合器不会代劳。
pub trait Widget: Send + 'static {
    fn name(&self) -> &str;

    /// 从布局移除前调用一次；之后实例即被丢弃。
    fn unmount(&mut self);

    /// 当前的文本渲染，供布局快照使用。
    fn render(&self) -> String {
        String::new()
    }

    /// 发给该模块的用户输入（按钮、文本）。
    fn interact(&mut self, input: &str) -> anyhow::Result<()> {
        let _ = input;
        Ok(())
    }
}

impl fmt::Debug for dyn Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Widget({})", self.name())
    }
}

/// 远端容器以导出名暴露的内容：能从 [`WidgetProps`] 构造模块的工厂。
pub trait WidgetFactory: Send + Sync {
    fn type_name(&self) -> &'static str;

    /// 模块构建时依赖的共享包，`(名称, 版本)`。
    fn shared(&self) -> &[(&'static str, &'static str)] {
        &[]
    }

    fn instantiate(&self, props: WidgetProps) -> anyhow::Result<Box<dyn Widget>>;
}

impl fmt::Debug for dyn WidgetFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WidgetFactory({})", self.type_name())
    }
}

/// 只需总线即可构造的模块；`#[expose]` 要求实现它。
pub trait Mountable: Widget + Sized {
    fn mount(props: WidgetProps) -> anyhow::Result<Self>;
}

/// 把 [`Mountable`] 类型适配为 [`WidgetFactory`]。
pub struct MountableFactory<W> {
    shared: &'static [(&'static str, &'static str)],
    _w: std::marker::PhantomData<fn() -> W>,
}

impl<W: Mountable> MountableFactory<W> {
    pub const fn new() -> Self {
        Self {
            shared: &[],
            _w: std::marker::PhantomData,
        }
    }
    pub const fn with_shared(shared: &'static [(&'static str, &'static str)]) -> Self {
        Self {
            shared,
            _w: std::marker::PhantomData,
        }
    }
}

impl<W: Mountable> Default for MountableFactory<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Mountable> WidgetFactory for MountableFactory<W> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<W>()
    }
    fn shared(&self) -> &[(&'static str, &'static str)] {
        self.shared
    }
    fn instantiate(&self, props: WidgetProps) -> anyhow::Result<Box<dyn Widget>> {
        Ok(Box::new(W::mount(props)?))
    }
}

/// 闭包工厂：构造时需要额外状态的模块用它。
pub struct FnFactory<F> {
    name: &'static str,
    shared: Vec<(&'static str, &'static str)>,
    build: F,
}

impl<F> FnFactory<F>
where
    F: Fn(WidgetProps) -> anyhow::Result<Box<dyn Widget>> + Send + Sync,
{
    pub fn new(name: &'static str, build: F) -> Self {
        Self {
            name,
            shared: Vec::new(),
            build,
        }
    }

    pub fn shared_dep(mut self, name: &'static str, version: &'static str) -> Self {
        self.shared.push((name, version));
        self
    }
}

impl<F> WidgetFactory for FnFactory<F>
where
    F: Fn(WidgetProps) -> anyhow::Result<Box<dyn Widget>> + Send + Sync,
{
    fn type_name(&self) -> &'static str {
        self.name
    }
    fn shared(&self) -> &[(&'static str, &'static str)] {
        &self.shared
    }
    fn instantiate(&self, props: WidgetProps) -> anyhow::Result<Box<dyn Widget>> {
        (self.build)(props)
    }
}
