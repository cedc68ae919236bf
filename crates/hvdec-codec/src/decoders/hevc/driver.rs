//! 解码驱动: 推动引擎直到不再能产出图像, 并转发引擎警告.

use hvdec_core::HvResult;
use log::{debug, trace};

use crate::engine::{DecodeEngine, DecodeStatus};
use crate::host::HostPipeline;

/// 反复执行解码步骤, 直到引擎需要输入、输出队列已满或有图像可取
///
/// # 返回
/// 结束本轮推动的状态 (不会是 `MoreWork` 或 `Failed`)
pub fn pump(engine: &mut dyn DecodeEngine, context: &str) -> HvResult<DecodeStatus> {
    let mut steps = 0usize;
    loop {
        match engine.decode_step() {
            DecodeStatus::MoreWork => steps += 1,
            DecodeStatus::Failed(fault) => return Err(fault.into_error(context)),
            status => {
                trace!("解码推动结束: {status:?}, 共 {steps} 步");
                return Ok(status);
            }
        }
    }
}

/// 取出引擎累积的警告并转发给宿主
pub fn drain_warnings(engine: &mut dyn DecodeEngine, host: &dyn HostPipeline) -> usize {
    let mut count = 0;
    while let Some(fault) = engine.next_warning() {
        debug!("转发解码引擎警告: {fault}");
        host.post_warning(&fault.to_string());
        count += 1;
    }
    count
}

/// 丢弃引擎中所有已完成的图像
pub fn discard_pictures(engine: &mut dyn DecodeEngine) -> usize {
    let mut count = 0;
    while let Some(picture) = engine.next_picture() {
        engine.release_picture(picture);
        count += 1;
    }
    count
}
