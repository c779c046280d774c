// SPDX-License-Identifier: CEPL-1.0
use crate::error::{RenderError, RenderResult};
use ash::vk;

/// First memory type allowed by `type_bits` whose flags contain all of `wanted`.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    wanted: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..props.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32)).find(|&i| {
        (type_bits & (1 << i)) != 0 && props.memory_types[i as usize].property_flags.contains(wanted)
    })
}

pub(crate) fn memory_type_for(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    wanted: vk::MemoryPropertyFlags,
) -> RenderResult<u32> {
    find_memory_type(props, type_bits, wanted)
        .ok_or(RenderError::NoCompatibleMemoryType { type_bits, wanted })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut p = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, f) in flags.iter().enumerate() {
            p.memory_types[i].property_flags = *f;
        }
        p
    }

    const HV: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::HOST_VISIBLE;
    const HC: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::HOST_COHERENT;
    const DL: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::DEVICE_LOCAL;

    #[test]
    fn requires_every_wanted_flag() {
        let p = props(&[DL, HV, HV | HC]);
        assert_eq!(find_memory_type(&p, 0b111, HV | HC), Some(2));
        assert_eq!(find_memory_type(&p, 0b111, DL), Some(0));
    }

    #[test]
    fn respects_type_mask() {
        let p = props(&[HV | HC, HV | HC]);
        assert_eq!(find_memory_type(&p, 0b10, HV), Some(1));
        assert_eq!(find_memory_type(&p, 0, HV), None);
    }

    #[test]
    fn missing_type_is_an_error() {
        let p = props(&[DL]);
        assert!(matches!(
            memory_type_for(&p, 0b1, HV),
            Err(RenderError::NoCompatibleMemoryType { type_bits: 1, .. })
        ));
    }
}
